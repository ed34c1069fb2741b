//! MLflow tracking server client over the REST 2.0 API.

use std::time::Duration;

use reqwest::blocking::{Client, RequestBuilder, Response};
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::debug;

use super::{ModelUri, Registry, RegistryError, RunInfo, RunStatus, ARTIFACT_SCHEME};
use crate::model::{ARTIFACT_FILE, ARTIFACT_PATH};

const API: &str = "api/2.0/mlflow";
const ARTIFACT_API: &str = "api/2.0/mlflow-artifacts/artifacts";

pub struct MlflowClient {
    client: Client,
    base_url: String,
}

#[derive(Debug, Default, Deserialize)]
struct ApiErrorBody {
    #[serde(default)]
    error_code: String,
    #[serde(default)]
    message: String,
}

#[derive(Debug, Deserialize)]
struct CreateExperimentResponse {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct GetExperimentResponse {
    experiment: ExperimentBody,
}

#[derive(Debug, Deserialize)]
struct ExperimentBody {
    experiment_id: String,
}

#[derive(Debug, Deserialize)]
struct RunResponse {
    run: RunBody,
}

#[derive(Debug, Deserialize)]
struct RunBody {
    info: RunInfoBody,
}

#[derive(Debug, Deserialize)]
struct RunInfoBody {
    run_id: String,
    experiment_id: String,
    artifact_uri: String,
}

#[derive(Debug, Deserialize)]
struct AliasResponse {
    model_version: ModelVersionBody,
}

#[derive(Debug, Deserialize)]
struct ModelVersionBody {
    source: String,
    #[serde(default)]
    run_id: String,
}

#[derive(Debug, Serialize)]
struct MetricBody<'a> {
    key: &'a str,
    value: f64,
    timestamp: i64,
    step: i64,
}

impl MlflowClient {
    pub fn new(base_url: &str) -> Result<Self, RegistryError> {
        let client = Client::builder().timeout(Duration::from_secs(300)).build()?;
        Ok(Self {
            client,
            base_url: base_url.trim_end_matches('/').to_string(),
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}/{API}/{path}", self.base_url)
    }

    /// Proxy URL for an artifact location such as `mlflow-artifacts:/1/<run>/artifacts`.
    fn artifact_url(&self, artifact_uri: &str, path: &str) -> Result<String, RegistryError> {
        let root = artifact_uri
            .strip_prefix(ARTIFACT_SCHEME)
            .ok_or_else(|| RegistryError::UnsupportedUri(artifact_uri.to_string()))?
            .trim_matches('/');
        Ok(format!("{}/{ARTIFACT_API}/{root}/{}", self.base_url, path.trim_start_matches('/')))
    }

    fn send(request: RequestBuilder) -> Result<Response, RegistryError> {
        let response = request.send()?;
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }

        let body: ApiErrorBody = response.json().unwrap_or_default();
        if body.error_code == "RESOURCE_ALREADY_EXISTS" {
            return Err(RegistryError::AlreadyExists(body.message));
        }
        Err(RegistryError::Api {
            status: status.as_u16(),
            code: body.error_code,
            message: body.message,
        })
    }

    fn decode<T: DeserializeOwned>(response: Response) -> Result<T, RegistryError> {
        response.json().map_err(|e| RegistryError::Decode(e.to_string()))
    }

    fn post<T: DeserializeOwned>(&self, path: &str, body: serde_json::Value) -> Result<T, RegistryError> {
        debug!(path, "registry POST");
        Self::decode(Self::send(self.client.post(self.endpoint(path)).json(&body))?)
    }

    fn post_unit(&self, path: &str, body: serde_json::Value) -> Result<(), RegistryError> {
        debug!(path, "registry POST");
        Self::send(self.client.post(self.endpoint(path)).json(&body))?;
        Ok(())
    }

    fn get<T: DeserializeOwned>(&self, path: &str, query: &[(&str, &str)]) -> Result<T, RegistryError> {
        debug!(path, "registry GET");
        Self::decode(Self::send(self.client.get(self.endpoint(path)).query(query))?)
    }

    /// Artifact location a registered model version's `source` points at.
    fn resolve_source(&self, version: &ModelVersionBody) -> Result<String, RegistryError> {
        if version.source.starts_with(ARTIFACT_SCHEME) {
            return Ok(version.source.clone());
        }
        if let Some(rest) = version.source.strip_prefix("runs:/") {
            let (run_id, path) = rest.split_once('/').unwrap_or((rest, ARTIFACT_PATH));
            let run_id = if run_id.is_empty() { version.run_id.as_str() } else { run_id };
            let run: RunResponse = self.get("runs/get", &[("run_id", run_id)])?;
            return Ok(format!("{}/{}", run.run.info.artifact_uri.trim_end_matches('/'), path));
        }
        Err(RegistryError::UnsupportedUri(version.source.clone()))
    }
}

fn now_ms() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

impl Registry for MlflowClient {
    fn create_experiment(&self, name: &str) -> Result<String, RegistryError> {
        let created: CreateExperimentResponse = self.post("experiments/create", json!({ "name": name }))?;
        Ok(created.experiment_id)
    }

    fn experiment_id_by_name(&self, name: &str) -> Result<String, RegistryError> {
        let found: GetExperimentResponse = self.get("experiments/get-by-name", &[("experiment_name", name)])?;
        Ok(found.experiment.experiment_id)
    }

    fn create_run(&self, experiment_id: &str, run_name: &str) -> Result<RunInfo, RegistryError> {
        let created: RunResponse = self.post(
            "runs/create",
            json!({
                "experiment_id": experiment_id,
                "run_name": run_name,
                "start_time": now_ms(),
            }),
        )?;
        let info = created.run.info;
        Ok(RunInfo {
            run_id: info.run_id,
            experiment_id: info.experiment_id,
            artifact_uri: info.artifact_uri,
        })
    }

    fn log_param(&self, run_id: &str, key: &str, value: &str) -> Result<(), RegistryError> {
        self.post_unit(
            "runs/log-parameter",
            json!({ "run_id": run_id, "key": key, "value": value }),
        )
    }

    fn log_metrics(&self, run_id: &str, metrics: &[(String, f64)]) -> Result<(), RegistryError> {
        let timestamp = now_ms();
        let metrics: Vec<MetricBody> = metrics
            .iter()
            .map(|(key, value)| MetricBody {
                key: key.as_str(),
                value: *value,
                timestamp,
                step: 0,
            })
            .collect();
        self.post_unit("runs/log-batch", json!({ "run_id": run_id, "metrics": metrics }))
    }

    fn log_artifact(&self, run: &RunInfo, path: &str, bytes: Vec<u8>) -> Result<(), RegistryError> {
        let url = self.artifact_url(&run.artifact_uri, path)?;
        debug!(%url, bytes = bytes.len(), "uploading artifact");
        Self::send(self.client.put(url).body(bytes))?;
        Ok(())
    }

    fn end_run(&self, run_id: &str, status: RunStatus) -> Result<(), RegistryError> {
        self.post_unit(
            "runs/update",
            json!({ "run_id": run_id, "status": status.as_str(), "end_time": now_ms() }),
        )
    }

    fn download_model(&self, uri: &ModelUri) -> Result<Vec<u8>, RegistryError> {
        let found: AliasResponse = self.get(
            "registered-models/alias",
            &[("name", uri.name.as_str()), ("alias", uri.alias.as_str())],
        )?;
        let location = self.resolve_source(&found.model_version)?;
        let url = self.artifact_url(&location, ARTIFACT_FILE)?;
        debug!(%url, "downloading model artifact");
        let response = Self::send(self.client.get(url))?;
        Ok(response.bytes()?.to_vec())
    }
}
