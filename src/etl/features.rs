//! Column selection, median imputation and derived features.

use polars::prelude::*;
use tracing::debug;

use super::EtlError;
use crate::schema::{RAW_FEATURES, TARGET};

/// Null counts over a frame, before or after cleaning.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QualityReport {
    pub columns_with_missing: usize,
    pub total_missing: usize,
}

pub fn quality_report(df: &DataFrame) -> QualityReport {
    let counts: Vec<usize> = df.get_columns().iter().map(|s| s.null_count()).collect();
    QualityReport {
        columns_with_missing: counts.iter().filter(|&&n| n > 0).count(),
        total_missing: counts.iter().sum(),
    }
}

/// Raw predictors followed by the target, the layout of the selected frame.
fn selected_columns() -> impl Iterator<Item = &'static str> {
    RAW_FEATURES.iter().copied().chain(std::iter::once(TARGET))
}

/// Keep the raw predictors and the target, cast to `Float64`.
pub fn select_features(raw: &DataFrame) -> Result<DataFrame, EtlError> {
    if let Some(missing) = selected_columns().find(|name| raw.column(name).is_err()) {
        return Err(EtlError::MissingColumn(missing.to_string()));
    }

    let selection: Vec<Expr> = selected_columns()
        .map(|name| col(name).cast(DataType::Float64))
        .collect();
    Ok(raw.clone().lazy().select(selection).collect()?)
}

/// Fill nulls with the median of their column over this frame.
pub fn impute_missing(selected: DataFrame) -> Result<DataFrame, EtlError> {
    let fills: Vec<Expr> = selected
        .get_columns()
        .iter()
        .filter(|s| s.null_count() > 0)
        .map(|s| {
            let name = s.name().to_string();
            debug!(column = %name, nulls = s.null_count(), "imputing with median");
            col(&name).fill_null(col(&name).median())
        })
        .collect();

    if fills.is_empty() {
        return Ok(selected);
    }
    Ok(selected.lazy().with_columns(fills).collect()?)
}

/// Append the derived columns after the selected ones.
pub fn derive_features(imputed: DataFrame) -> Result<DataFrame, EtlError> {
    Ok(imputed
        .lazy()
        .with_columns([
            (col("YrSold") - col("YearBuilt")).alias("HouseAge"),
            (col("YrSold") - col("YearRemodAdd")).alias("RemodAge"),
            (col("TotalBsmtSF") + col("1stFlrSF") + col("2ndFlrSF")).alias("TotalSF"),
            (col("FullBath") + lit(0.5) * col("HalfBath")).alias("TotalBath"),
            (col(TARGET) / col("GrLivArea")).alias("PricePerSqFt"),
        ])
        .collect()?)
}

/// Select the modelling columns, fill gaps with per-column medians and append
/// the derived features.
///
/// Medians come from the frame passed in, so the output is a function of the
/// exact extract being processed.
pub fn engineer_features(raw: &DataFrame) -> Result<DataFrame, EtlError> {
    derive_features(impute_missing(select_features(raw)?)?)
}
