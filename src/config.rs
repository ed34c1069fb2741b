//! Runtime settings resolved from the environment (optionally a `.env` file)
//! and threaded explicitly into each component.

use std::path::{Path, PathBuf};

pub const DEFAULT_TRACKING_URI: &str = "http://localhost:30000";
pub const DEFAULT_EXPERIMENT: &str = "house-price-mlflow-artifacts";
pub const DEFAULT_MODEL_URI: &str = "models:/housing model@production";
pub const DEFAULT_BIND: &str = "0.0.0.0:3000";

/// Configuration shared by the ETL, training, serving and pipeline commands.
#[derive(Debug, Clone, PartialEq)]
pub struct Settings {
    /// Base address of the experiment registry.
    pub tracking_uri: String,
    /// Root holding `raw/` and `processed/`.
    pub data_dir: PathBuf,
    /// Experiment the training runs are logged under.
    pub experiment: String,
    /// Registry alias the server loads at startup.
    pub model_uri: String,
    /// Listen address for the prediction server.
    pub bind_addr: String,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            tracking_uri: DEFAULT_TRACKING_URI.to_string(),
            data_dir: PathBuf::from("data"),
            experiment: DEFAULT_EXPERIMENT.to_string(),
            model_uri: DEFAULT_MODEL_URI.to_string(),
            bind_addr: DEFAULT_BIND.to_string(),
        }
    }
}

impl Settings {
    /// Load settings from the process environment, reading `.env` first when present.
    pub fn from_env() -> Self {
        if let Ok(path) = dotenvy::dotenv() {
            tracing::debug!(path = %path.display(), "loaded .env");
        }
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Resolve settings through an arbitrary key lookup, falling back to defaults.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = Self::default();
        let var = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        Self {
            tracking_uri: var("MLFLOW_TRACKING_URI").unwrap_or(defaults.tracking_uri),
            data_dir: var("HOUSE_PRICE_DATA_DIR").map(PathBuf::from).unwrap_or(defaults.data_dir),
            experiment: var("HOUSE_PRICE_EXPERIMENT").unwrap_or(defaults.experiment),
            model_uri: var("HOUSE_PRICE_MODEL_URI").unwrap_or(defaults.model_uri),
            bind_addr: var("HOUSE_PRICE_BIND").unwrap_or(defaults.bind_addr),
        }
    }

    pub fn raw_csv(&self) -> PathBuf {
        self.data_dir.join("raw").join("train.csv")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.data_dir.join("processed")
    }

    pub fn with_data_dir(mut self, dir: impl AsRef<Path>) -> Self {
        self.data_dir = dir.as_ref().to_path_buf();
        self
    }
}
