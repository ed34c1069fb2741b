//! Experiment registry seam: runs, params, metrics, artifacts and model loading.

pub mod mlflow;

use std::fmt;

pub use mlflow::MlflowClient;

/// Scheme of artifact locations served through the tracking server's proxy.
pub const ARTIFACT_SCHEME: &str = "mlflow-artifacts:/";

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("already exists: {0}")]
    AlreadyExists(String),

    #[error("registry returned {status} {code}: {message}")]
    Api {
        status: u16,
        code: String,
        message: String,
    },

    #[error("registry unreachable: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("unexpected registry response: {0}")]
    Decode(String),

    #[error("unsupported uri: {0}")]
    UnsupportedUri(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunInfo {
    pub run_id: String,
    pub experiment_id: String,
    pub artifact_uri: String,
}

impl RunInfo {
    /// Whether artifacts of this run go through the tracking server's HTTP proxy.
    pub fn uses_artifact_proxy(&self) -> bool {
        self.artifact_uri.starts_with(ARTIFACT_SCHEME)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Finished,
    Failed,
}

impl RunStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            RunStatus::Finished => "FINISHED",
            RunStatus::Failed => "FAILED",
        }
    }
}

/// `models:/<name>@<alias>`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelUri {
    pub name: String,
    pub alias: String,
}

impl ModelUri {
    pub fn parse(uri: &str) -> Result<Self, RegistryError> {
        let rest = uri
            .strip_prefix("models:/")
            .ok_or_else(|| RegistryError::UnsupportedUri(uri.to_string()))?;
        match rest.rsplit_once('@') {
            Some((name, alias)) if !name.is_empty() && !alias.is_empty() => Ok(Self {
                name: name.to_string(),
                alias: alias.to_string(),
            }),
            _ => Err(RegistryError::UnsupportedUri(uri.to_string())),
        }
    }
}

impl fmt::Display for ModelUri {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "models:/{}@{}", self.name, self.alias)
    }
}

/// Append-only run store. Implementations are blocking.
pub trait Registry {
    /// Create an experiment; fails with [`RegistryError::AlreadyExists`] on a name clash.
    fn create_experiment(&self, name: &str) -> Result<String, RegistryError>;

    fn experiment_id_by_name(&self, name: &str) -> Result<String, RegistryError>;

    fn create_run(&self, experiment_id: &str, run_name: &str) -> Result<RunInfo, RegistryError>;

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), RegistryError>;

    fn log_params(&self, run_id: &str, params: &[(String, String)]) -> Result<(), RegistryError> {
        for (key, value) in params {
            self.log_param(run_id, key, value)?;
        }
        Ok(())
    }

    fn log_metrics(&self, run_id: &str, metrics: &[(String, f64)]) -> Result<(), RegistryError>;

    /// Store `bytes` at `<run artifact root>/<path>`.
    fn log_artifact(&self, run: &RunInfo, path: &str, bytes: Vec<u8>) -> Result<(), RegistryError>;

    fn end_run(&self, run_id: &str, status: RunStatus) -> Result<(), RegistryError>;

    /// Fetch the serialized artifact a `models:/<name>@<alias>` uri resolves to.
    fn download_model(&self, uri: &ModelUri) -> Result<Vec<u8>, RegistryError>;
}

/// Create the experiment if needed and return its id. A concurrent or
/// earlier creation is not an error.
pub fn ensure_experiment(registry: &dyn Registry, name: &str) -> Result<String, RegistryError> {
    match registry.create_experiment(name) {
        Ok(id) => {
            println!("✓ Created new experiment with ID: {id}");
            Ok(id)
        }
        Err(RegistryError::AlreadyExists(_)) => {
            println!("Experiment already exists, using it...");
            registry.experiment_id_by_name(name)
        }
        Err(err) => Err(err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_alias_uri() {
        let uri = ModelUri::parse("models:/housing model@production").unwrap();
        assert_eq!(uri.name, "housing model");
        assert_eq!(uri.alias, "production");
        assert_eq!(uri.to_string(), "models:/housing model@production");
    }

    #[test]
    fn rejects_other_uris() {
        for bad in ["runs:/abc/model", "models:/housing", "models:/@prod", "models:/m@"] {
            assert!(ModelUri::parse(bad).is_err(), "{bad}");
        }
    }

    #[test]
    fn artifact_proxy_check() {
        let mut run = RunInfo {
            run_id: "r".into(),
            experiment_id: "1".into(),
            artifact_uri: "mlflow-artifacts:/1/r/artifacts".into(),
        };
        assert!(run.uses_artifact_proxy());
        run.artifact_uri = "/mlruns/1/r/artifacts".into();
        assert!(!run.uses_artifact_proxy());
    }
}
