mod common;

use common::FakeRegistry;
use house_price_pipeline::etl::{column_values, load_csv_file};
use house_price_pipeline::registry::{ModelUri, Registry, RunStatus};
use house_price_pipeline::schema::FEATURES;
use house_price_pipeline::serve::{PredictResponse, PredictionAdapter};
use house_price_pipeline::train::{BaselineOutcome, ADVANCED_RUN, BASELINE_RUN};
use house_price_pipeline::{run_etl, run_training, ModelArtifact, Regressor, Settings};
use serde_json::{json, Map, Value};

fn prepared(rows: usize) -> (tempfile::TempDir, Settings) {
    let dir = tempfile::tempdir().unwrap();
    common::write_raw_extract(dir.path(), rows);
    let settings = Settings::default().with_data_dir(dir.path());
    run_etl(&settings).unwrap();
    (dir, settings)
}

#[test]
fn both_runs_are_logged_through_the_artifact_proxy() {
    let (_dir, settings) = prepared(120);
    let registry = FakeRegistry::new("mlflow-artifacts:/1/");

    let report = run_training(&settings, &registry).unwrap();
    assert_eq!(report.experiment_id, "1");

    let baseline = registry.run_named(BASELINE_RUN);
    assert_eq!(baseline.status, Some(RunStatus::Finished));
    assert!(matches!(report.baseline, BaselineOutcome::Logged { .. }));
    assert!(baseline.params.contains(&("model_type".into(), "LinearRegression".into())));
    for key in ["train_rmse", "train_r2", "val_mae", "val_mape"] {
        assert!(baseline.metrics.iter().any(|(k, _)| k == key), "baseline missing {key}");
    }

    let advanced = registry.run_named(ADVANCED_RUN);
    assert_eq!(advanced.status, Some(RunStatus::Finished));
    for key in ["n_estimators", "learning_rate", "max_depth", "random_state"] {
        assert!(advanced.params.iter().any(|(k, _)| k == key), "advanced missing param {key}");
    }
    assert!(advanced.metrics.iter().any(|(k, _)| k == "test_r2"));
    assert_eq!(report.advanced.top_features.len(), 10);
    assert!(report.advanced.test_r2 > 0.5, "test r2 {}", report.advanced.test_r2);

    let bytes = &advanced.artifacts["model/model.json"];
    let artifact = ModelArtifact::from_json_slice(bytes).unwrap();
    assert!(matches!(artifact.regressor, Regressor::GradientBoosting(_)));
    assert_eq!(artifact.model_type, "GradientBoostingRegressor");
}

#[test]
fn baseline_is_skipped_when_artifacts_bypass_the_proxy() {
    let (_dir, settings) = prepared(60);
    let registry = FakeRegistry::new("file:///mlruns/1/");

    let report = run_training(&settings, &registry).unwrap();

    match &report.baseline {
        BaselineOutcome::Skipped { artifact_uri, .. } => assert!(artifact_uri.starts_with("file:///")),
        other => panic!("baseline should be skipped, got {other:?}"),
    }
    let baseline = registry.run_named(BASELINE_RUN);
    assert_eq!(baseline.status, Some(RunStatus::Finished));
    assert!(baseline.metrics.is_empty());
    assert!(baseline.artifacts.is_empty());

    // the boosted run still happens
    let advanced = registry.run_named(ADVANCED_RUN);
    assert_eq!(advanced.status, Some(RunStatus::Finished));
    assert!(advanced.artifacts.contains_key("model/model.json"));
}

#[test]
fn second_training_reuses_the_experiment() {
    let (_dir, settings) = prepared(60);
    let registry = FakeRegistry::new("mlflow-artifacts:/1/");

    let first = run_training(&settings, &registry).unwrap();
    let second = run_training(&settings, &registry).unwrap();

    assert_eq!(first.experiment_id, second.experiment_id);
    assert_eq!(registry.runs.borrow().len(), 4);
}

#[test]
fn missing_processed_data_fails_before_any_run() {
    let dir = tempfile::tempdir().unwrap();
    let settings = Settings::default().with_data_dir(dir.path());
    let registry = FakeRegistry::new("mlflow-artifacts:/1/");

    assert!(run_training(&settings, &registry).is_err());
    assert!(registry.runs.borrow().is_empty());
}

#[test]
fn registered_model_serves_predictions() {
    let (_dir, settings) = prepared(120);
    let registry = FakeRegistry::new("mlflow-artifacts:/1/");
    run_training(&settings, &registry).unwrap();
    registry.set_alias("models:/housing model@production", ADVANCED_RUN, "model/model.json");

    let uri = ModelUri::parse(&settings.model_uri).unwrap();
    let artifact = ModelArtifact::from_json_slice(&registry.download_model(&uri).unwrap()).unwrap();
    let adapter = PredictionAdapter::new(artifact);

    let processed = load_csv_file(&settings.processed_dir().join("test.csv")).unwrap();
    let mut fields = Map::new();
    for name in FEATURES {
        let value = column_values(&processed, name).unwrap()[0];
        fields.insert(name.to_string(), json!(value));
    }

    match adapter.respond(fields) {
        PredictResponse::Success {
            predicted_price,
            predicted_price_formatted,
        } => {
            assert!(predicted_price > 0.0);
            assert!(predicted_price_formatted.starts_with('$'));
        }
        other => panic!("expected success, got {other:?}"),
    }

    let mut partial: Map<String, Value> = Map::new();
    partial.insert("GrLivArea".into(), json!(1500));
    assert!(matches!(adapter.respond(partial), PredictResponse::Error { .. }));
}
