//! Regressors, evaluation metrics and the serialized model artifact.

pub mod boosting;
pub mod linear;
pub mod metrics;

use std::collections::BTreeMap;
use std::path::Path;

use ndarray::{Array1, Array2, ArrayView2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};

use crate::etl::{column_values, EtlError};
use crate::schema::{FEATURES, TARGET};

pub use boosting::{rank_features, BoostingParams, GradientBoosting};
pub use linear::LinearRegression;
pub use metrics::RegressionMetrics;

/// Artifact path inside a run's artifact store.
pub const ARTIFACT_PATH: &str = "model";
pub const ARTIFACT_FILE: &str = "model.json";

#[derive(Debug, thiserror::Error)]
pub enum FitError {
    #[error("training set is empty")]
    EmptyTrainingSet,

    #[error("{rows} feature rows but {targets} targets")]
    ShapeMismatch { rows: usize, targets: usize },

    #[error("normal equations are singular")]
    Singular,
}

#[derive(Debug, thiserror::Error)]
pub enum ArtifactError {
    #[error("artifact is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),

    #[error("artifact feature schema does not match the serving schema")]
    SchemaMismatch,

    #[error("artifact regressor is inconsistent: {0}")]
    Corrupt(String),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Regressor {
    Linear(LinearRegression),
    GradientBoosting(GradientBoosting),
}

impl Regressor {
    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        match self {
            Regressor::Linear(model) => model.predict(x),
            Regressor::GradientBoosting(model) => model.predict(x),
        }
    }

    pub fn model_type(&self) -> &'static str {
        match self {
            Regressor::Linear(_) => "LinearRegression",
            Regressor::GradientBoosting(_) => "GradientBoostingRegressor",
        }
    }

    pub fn n_features(&self) -> usize {
        match self {
            Regressor::Linear(model) => model.n_features(),
            Regressor::GradientBoosting(model) => model.n_features(),
        }
    }
}

/// Trained model plus the metadata the server needs to feed it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub model_type: String,
    pub feature_names: Vec<String>,
    pub params: BTreeMap<String, String>,
    pub regressor: Regressor,
}

impl ModelArtifact {
    pub fn new(regressor: Regressor, feature_names: Vec<String>, params: Vec<(String, String)>) -> Self {
        Self {
            model_type: regressor.model_type().to_string(),
            feature_names,
            params: params.into_iter().collect(),
            regressor,
        }
    }

    pub fn to_json_bytes(&self) -> Result<Vec<u8>, ArtifactError> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode and validate against the serving feature schema.
    pub fn from_json_slice(bytes: &[u8]) -> Result<Self, ArtifactError> {
        let artifact: Self = serde_json::from_slice(bytes)?;
        artifact.validate()?;
        Ok(artifact)
    }

    pub fn load(path: &Path) -> Result<Self, ArtifactError> {
        Self::from_json_slice(&std::fs::read(path)?)
    }

    pub fn validate(&self) -> Result<(), ArtifactError> {
        if self.feature_names.len() != FEATURES.len()
            || self.feature_names.iter().zip(FEATURES).any(|(a, b)| a != b)
        {
            return Err(ArtifactError::SchemaMismatch);
        }
        if self.regressor.n_features() != FEATURES.len() {
            return Err(ArtifactError::Corrupt(format!(
                "regressor expects {} features, schema has {}",
                self.regressor.n_features(),
                FEATURES.len()
            )));
        }
        if let Regressor::GradientBoosting(model) = &self.regressor {
            if !model.is_consistent() {
                return Err(ArtifactError::Corrupt("tree references out of range".into()));
            }
        }
        Ok(())
    }
}

/// Feature matrix in schema order and the target vector.
#[derive(Debug, Clone)]
pub struct Design {
    pub x: Array2<f64>,
    pub y: Array1<f64>,
}

impl Design {
    pub fn rows(&self) -> usize {
        self.x.nrows()
    }
}

/// Split a processed frame into features (schema order) and target.
pub fn split_features_and_target(df: &DataFrame) -> Result<Design, EtlError> {
    if let Some(missing) = FEATURES.iter().find(|name| df.column(name).is_err()) {
        return Err(EtlError::MissingColumn(missing.to_string()));
    }
    let x = df.select(FEATURES)?.to_ndarray::<Float64Type>(IndexOrder::C)?;
    let y = Array1::from(column_values(df, TARGET)?);
    Ok(Design { x, y })
}
