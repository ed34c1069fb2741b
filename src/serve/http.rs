//! HTTP surface of the prediction adapter.
//!
//! `POST /predict` always answers 200 with the structured body; `/health`
//! does not look at the model at all.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::{json, Map, Value};
use tracing::info;

use super::{PredictError, Prediction, PredictResponse, PredictionAdapter};

/// Envelope key some clients wrap the feature mapping in.
const ENVELOPE_KEY: &str = "input_data";

pub fn router(adapter: Arc<PredictionAdapter>) -> Router {
    Router::new()
        .route("/predict", post(predict))
        .route("/health", get(health).post(health))
        .with_state(adapter)
}

/// Pull the feature mapping out of a request body, unwrapping the envelope.
pub fn parse_request(body: &[u8]) -> Result<Map<String, Value>, PredictError> {
    let value: Value = serde_json::from_slice(body).map_err(|e| PredictError::TypeMismatch {
        feature: "<body>".into(),
        detail: e.to_string(),
    })?;

    match value {
        Value::Object(mut fields) => match fields.get(ENVELOPE_KEY) {
            Some(Value::Object(_)) if fields.len() == 1 => match fields.remove(ENVELOPE_KEY) {
                Some(Value::Object(inner)) => Ok(inner),
                _ => Ok(fields),
            },
            _ => Ok(fields),
        },
        _ => Err(PredictError::TypeMismatch {
            feature: "<body>".into(),
            detail: "expected a JSON object".into(),
        }),
    }
}

pub async fn predict(State(adapter): State<Arc<PredictionAdapter>>, body: Bytes) -> Json<PredictResponse> {
    let response = match parse_request(&body) {
        Ok(fields) => adapter.respond(fields),
        Err(err) => PredictResponse::from(Err::<Prediction, _>(err)),
    };
    Json(response)
}

pub async fn health() -> Json<Value> {
    Json(json!({ "status": "healthy" }))
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        tracing::error!(error = %err, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    info!("shutting down");
}

/// Bind `addr` and serve until ctrl-c.
pub async fn serve(adapter: Arc<PredictionAdapter>, addr: &str) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %listener.local_addr()?, model = %adapter.artifact().model_type, "prediction server listening");
    println!("Serving predictions on http://{}", listener.local_addr()?);

    axum::serve(listener, router(adapter))
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    Ok(())
}
