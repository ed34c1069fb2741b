//! House price MLOps pipeline: ETL, training, serving and a linear DAG runner.
//!
//! Steps
//! 1. `etl` loads the raw Kaggle extract, engineers features and writes the
//!    train/val/test partitions plus a metadata sidecar
//! 2. `train` fits a linear baseline and a boosted ensemble and logs both to
//!    the experiment registry
//! 3. `serve` loads the promoted model once and answers prediction requests
//! 4. `pipeline` chains the above as external processes on a weekly cadence

pub mod config;
pub mod currency;
pub mod etl;
pub mod logging;
pub mod model;
pub mod pipeline;
pub mod registry;
pub mod schema;
pub mod serve;
pub mod train;

pub use config::Settings;
pub use etl::{run_etl, EtlError};
pub use model::{ModelArtifact, Regressor};
pub use train::run_training;
