//! Extract, transform and partition the raw housing extract.
//!
//! ```text
//! data/raw/train.csv ─► select + impute + derive ─► 60/20/20 split ─► data/processed/*
//! ```

pub mod features;
pub mod fetch;
pub mod metadata;
pub mod split;

use std::fs::{self, File};
use std::path::{Path, PathBuf};

use polars::prelude::*;
use tracing::info;

use crate::config::Settings;
use crate::currency::format_usd;
use crate::schema::{DERIVED_FEATURES, TARGET};

pub use features::{derive_features, engineer_features, impute_missing, quality_report, select_features, QualityReport};
pub use metadata::{DatasetMetadata, PriceStats};
pub use split::{partition, Partitions, SplitConfig};

#[derive(Debug, thiserror::Error)]
pub enum EtlError {
    /// The raw extract is absent; nothing downstream can run.
    #[error("input file not found: {0}")]
    MissingInput(PathBuf),

    #[error("required column '{0}' is missing from the input")]
    MissingColumn(String),

    #[error("invalid split configuration: {0}")]
    InvalidSplit(String),

    #[error("dataframe error: {0}")]
    Polars(#[from] PolarsError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("metadata serialization failed: {0}")]
    Json(#[from] serde_json::Error),
}

/// Read a CSV with a header row. `NA` cells are read as nulls.
pub fn load_csv_file(path: &Path) -> Result<DataFrame, EtlError> {
    if !path.is_file() {
        return Err(EtlError::MissingInput(path.to_path_buf()));
    }

    let df = CsvReadOptions::default()
        .with_has_header(true)
        .with_infer_schema_length(None)
        .map_parse_options(|opts| opts.with_null_values(Some(NullValues::AllColumnsSingle("NA".into()))))
        .try_into_reader_with_file_path(Some(path.to_path_buf()))?
        .finish()?;

    info!(path = %path.display(), rows = df.height(), columns = df.width(), "loaded csv");
    Ok(df)
}

/// Write a frame as CSV with a header row, replacing any previous file.
pub fn write_csv_file(df: &mut DataFrame, path: &Path) -> Result<(), EtlError> {
    let mut file = File::create(path)?;
    CsvWriter::new(&mut file).include_header(true).finish(df)?;
    Ok(())
}

/// Values of one column as `f64`; nulls become NaN.
pub fn column_values(df: &DataFrame, name: &str) -> Result<Vec<f64>, EtlError> {
    let series = df
        .column(name)
        .map_err(|_| EtlError::MissingColumn(name.to_string()))?
        .cast(&DataType::Float64)?;

    Ok(series.f64()?.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
}

/// Run the whole ETL step and return the metadata written next to the partitions.
pub fn run_etl(settings: &Settings) -> anyhow::Result<DatasetMetadata> {
    println!("{}", "=".repeat(60));
    println!("House Price Prediction - ETL Pipeline");
    println!("{}", "=".repeat(60));

    // 1. Load raw data
    println!("\n[1/6] Loading raw data...");
    let raw = load_csv_file(&settings.raw_csv())?;
    println!("   Loaded {} records with {} columns", raw.height(), raw.width());
    println!("   Target variable: {TARGET}");

    // 2. Data quality checks
    println!("\n[2/6] Running data quality checks...");
    let quality = quality_report(&raw);
    println!("   Columns with missing values: {}", quality.columns_with_missing);
    println!("   Total missing values: {}", quality.total_missing);

    // 3. Feature selection
    println!("\n[3/6] Feature selection...");
    let selected = select_features(&raw)?;
    println!("   Selected {} features", selected.width() - 1);

    // 4. Handle missing values
    println!("\n[4/6] Handling missing values...");
    let imputed = impute_missing(selected)?;
    println!("   Missing values after handling: {}", quality_report(&imputed).total_missing);

    // 5. Feature engineering
    println!("\n[5/6] Feature engineering...");
    let enriched = derive_features(imputed)?;
    println!("   Created {} new features", DERIVED_FEATURES.len());
    println!("   Total features: {}", enriched.width() - 1);

    // 6. Train/validation/test split
    println!("\n[6/6] Splitting data...");
    let mut parts = partition(&enriched, &SplitConfig::default())?;
    let total = enriched.height().max(1) as f64;
    for (label, df) in [("Training", &parts.train), ("Validation", &parts.val), ("Test", &parts.test)] {
        println!(
            "   {label} set: {} records ({:.1}%)",
            df.height(),
            df.height() as f64 / total * 100.0
        );
    }

    println!("\nSaving processed data...");
    let out_dir = settings.processed_dir();
    fs::create_dir_all(&out_dir)?;
    write_csv_file(&mut parts.train, &out_dir.join("train.csv"))?;
    write_csv_file(&mut parts.val, &out_dir.join("val.csv"))?;
    write_csv_file(&mut parts.test, &out_dir.join("test.csv"))?;

    let meta = metadata::record(&enriched, &parts, chrono::Local::now().naive_local())?;
    metadata::write_metadata(&meta, &out_dir.join("metadata.json"))?;

    println!("\n{}", "=".repeat(60));
    println!("ETL Pipeline Completed Successfully!");
    println!("{}", "=".repeat(60));
    println!("\nOutput files:");
    println!("  - {} ({} rows)", out_dir.join("train.csv").display(), meta.train_records);
    println!("  - {} ({} rows)", out_dir.join("val.csv").display(), meta.val_records);
    println!("  - {} ({} rows)", out_dir.join("test.csv").display(), meta.test_records);
    println!("  - {}", out_dir.join("metadata.json").display());
    println!(
        "\nPrice Range: {} - {}",
        format_usd(meta.price_stats.min, 0),
        format_usd(meta.price_stats.max, 0)
    );
    println!("Average Price: {}", format_usd(meta.price_stats.mean, 0));

    info!(
        train = meta.train_records,
        val = meta.val_records,
        test = meta.test_records,
        "etl finished"
    );
    Ok(meta)
}
