//! Prediction adapter: field-name mapping in, price out.
//!
//! The artifact is loaded once and shared read-only; every request is an
//! independent transform, so concurrent calls need no locking.

pub mod http;

use ndarray::Array2;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::currency::format_usd;
use crate::model::ModelArtifact;
use crate::schema::{FEATURES, FIELD_ALIASES};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    SchemaMissing,
    TypeMismatch,
    InferenceFailure,
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum PredictError {
    /// Schema features absent after alias resolution, in schema order.
    #[error("Missing: [{}]", quoted_list(.0))]
    SchemaMissing(Vec<String>),

    #[error("feature '{feature}' is not numeric: {detail}")]
    TypeMismatch { feature: String, detail: String },

    #[error("inference failed: {0}")]
    InferenceFailure(String),
}

fn quoted_list(names: &[String]) -> String {
    names.iter().map(|name| format!("'{name}'")).collect::<Vec<_>>().join(", ")
}

impl PredictError {
    pub fn kind(&self) -> ErrorKind {
        match self {
            PredictError::SchemaMissing(_) => ErrorKind::SchemaMissing,
            PredictError::TypeMismatch { .. } => ErrorKind::TypeMismatch,
            PredictError::InferenceFailure(_) => ErrorKind::InferenceFailure,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Prediction {
    pub price: f64,
}

impl Prediction {
    pub fn formatted(&self) -> String {
        format_usd(self.price, 2)
    }
}

/// Wire shape of a prediction response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum PredictResponse {
    Success {
        predicted_price: f64,
        predicted_price_formatted: String,
    },
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl From<Result<Prediction, PredictError>> for PredictResponse {
    fn from(result: Result<Prediction, PredictError>) -> Self {
        match result {
            Ok(prediction) => PredictResponse::Success {
                predicted_price: prediction.price,
                predicted_price_formatted: prediction.formatted(),
            },
            Err(err) => PredictResponse::Error {
                kind: err.kind(),
                message: err.to_string(),
            },
        }
    }
}

/// Rename legacy field names. When both spellings are sent the legacy value wins.
pub fn resolve_aliases(mut fields: Map<String, Value>) -> Map<String, Value> {
    for (alias, canonical) in FIELD_ALIASES {
        if let Some(value) = fields.remove(alias) {
            fields.insert(canonical.to_string(), value);
        }
    }
    fields
}

fn numeric(feature: &str, value: &Value) -> Result<f64, PredictError> {
    let mismatch = |detail: String| PredictError::TypeMismatch {
        feature: feature.to_string(),
        detail,
    };
    let parsed = match value {
        Value::Number(n) => n.as_f64().ok_or_else(|| mismatch(format!("{n} is out of range")))?,
        Value::String(s) => s
            .trim()
            .parse::<f64>()
            .map_err(|_| mismatch(format!("could not convert string '{s}' to float")))?,
        Value::Bool(b) => {
            if *b {
                1.0
            } else {
                0.0
            }
        }
        Value::Null => return Err(mismatch("value is null".into())),
        Value::Array(_) | Value::Object(_) => return Err(mismatch("expected a scalar".into())),
    };
    if !parsed.is_finite() {
        return Err(mismatch(format!("input contains {parsed}, expected a finite number")));
    }
    Ok(parsed)
}

/// Shared across request handlers behind one `Arc`.
pub struct PredictionAdapter {
    artifact: ModelArtifact,
}

impl PredictionAdapter {
    pub fn new(artifact: ModelArtifact) -> Self {
        Self { artifact }
    }

    pub fn artifact(&self) -> &ModelArtifact {
        &self.artifact
    }

    pub fn predict(&self, input: Map<String, Value>) -> Result<Prediction, PredictError> {
        let fields = resolve_aliases(input);

        let missing: Vec<String> = FEATURES
            .iter()
            .filter(|name| !fields.contains_key(**name))
            .map(|name| name.to_string())
            .collect();
        if !missing.is_empty() {
            return Err(PredictError::SchemaMissing(missing));
        }

        let row = FEATURES
            .iter()
            .map(|name| numeric(name, &fields[*name]))
            .collect::<Result<Vec<f64>, _>>()?;
        let x = Array2::from_shape_vec((1, row.len()), row)
            .map_err(|e| PredictError::InferenceFailure(e.to_string()))?;

        let price = self
            .artifact
            .regressor
            .predict(x.view())
            .first()
            .copied()
            .ok_or_else(|| PredictError::InferenceFailure("model returned no output".into()))?;
        if !price.is_finite() {
            return Err(PredictError::InferenceFailure(format!("model returned {price}")));
        }

        Ok(Prediction { price })
    }

    /// [`predict`](Self::predict) rendered as the response body.
    pub fn respond(&self, input: Map<String, Value>) -> PredictResponse {
        let result = self.predict(input);
        if let Err(err) = &result {
            tracing::info!(kind = ?err.kind(), error = %err, "prediction rejected");
        }
        result.into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{LinearRegression, Regressor};
    use crate::schema::feature_names;
    use serde_json::json;

    /// price = 50_000 + 100 * GrLivArea
    fn adapter() -> PredictionAdapter {
        let coefficients = FEATURES.iter().map(|f| if *f == "GrLivArea" { 100.0 } else { 0.0 }).collect();
        let model = LinearRegression {
            intercept: 50_000.0,
            coefficients,
        };
        PredictionAdapter::new(ModelArtifact::new(Regressor::Linear(model), feature_names(), vec![]))
    }

    fn full_request() -> Map<String, Value> {
        FEATURES.iter().map(|f| (f.to_string(), json!(1))).collect()
    }

    #[test]
    fn missing_feature_message() {
        let mut request = full_request();
        request.remove("GarageCars");

        let err = adapter().predict(request).unwrap_err();
        assert_eq!(err, PredictError::SchemaMissing(vec!["GarageCars".into()]));
        assert_eq!(err.to_string(), "Missing: ['GarageCars']");
        assert_eq!(err.kind(), ErrorKind::SchemaMissing);
    }

    #[test]
    fn success_is_formatted_in_dollars() {
        let mut request = full_request();
        request.insert("GrLivArea".into(), json!(1585));

        let response = adapter().respond(request);
        assert_eq!(
            response,
            PredictResponse::Success {
                predicted_price: 208_500.0,
                predicted_price_formatted: "$208,500.00".into()
            }
        );
    }

    #[test]
    fn legacy_aliases_are_accepted() {
        let canonical = full_request();
        let mut legacy = full_request();
        let first = legacy.remove("1stFlrSF").unwrap();
        let second = legacy.remove("2ndFlrSF").unwrap();
        legacy.insert("FirstFlrSF".into(), first);
        legacy.insert("SecondFlrSF".into(), second);

        let a = adapter();
        assert_eq!(a.predict(canonical).unwrap(), a.predict(legacy).unwrap());
    }

    #[test]
    fn field_order_does_not_matter() {
        let mut reversed = Map::new();
        for f in FEATURES.iter().rev() {
            reversed.insert(f.to_string(), json!("2"));
        }
        let price = adapter().predict(reversed).unwrap().price;
        assert_eq!(price, 50_200.0);
    }

    #[test]
    fn non_numeric_value_is_a_type_mismatch() {
        let mut request = full_request();
        request.insert("LotArea".into(), json!("large"));
        let response = adapter().respond(request);
        match response {
            PredictResponse::Error { kind, message } => {
                assert_eq!(kind, ErrorKind::TypeMismatch);
                assert!(message.contains("LotArea"));
            }
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[test]
    fn non_finite_strings_are_rejected() {
        for raw in ["NaN", "inf", "-inf", " Infinity "] {
            let mut request = full_request();
            request.insert("GrLivArea".into(), json!(raw));
            match adapter().respond(request) {
                PredictResponse::Error { kind, message } => {
                    assert_eq!(kind, ErrorKind::TypeMismatch, "{raw}");
                    assert!(message.contains("GrLivArea"), "{message}");
                }
                other => panic!("{raw} was accepted: {other:?}"),
            }
        }
    }

    #[test]
    fn one_adapter_serves_concurrent_requests() {
        let shared = std::sync::Arc::new(adapter());
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let adapter = std::sync::Arc::clone(&shared);
                std::thread::spawn(move || {
                    let mut request = full_request();
                    request.insert("GrLivArea".into(), json!(1000 + i));
                    adapter.predict(request).unwrap().price
                })
            })
            .collect();
        let prices: Vec<f64> = handles.into_iter().map(|h| h.join().unwrap()).collect();
        assert_eq!(prices, [150_000.0, 150_100.0, 150_200.0, 150_300.0]);
    }

    #[test]
    fn response_wire_shape() {
        let ok = serde_json::to_value(PredictResponse::Success {
            predicted_price: 1.0,
            predicted_price_formatted: "$1.00".into(),
        })
        .unwrap();
        assert_eq!(ok["status"], "success");

        let err = serde_json::to_value(PredictResponse::from(Err::<Prediction, _>(PredictError::SchemaMissing(
            vec!["A".into(), "B".into()],
        ))))
        .unwrap();
        assert_eq!(
            err,
            json!({"status": "error", "kind": "schema_missing", "message": "Missing: ['A', 'B']"})
        );
    }
}
