//! Audit sidecar written next to the processed partitions.

use std::fs;
use std::path::Path;

use chrono::NaiveDateTime;
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};

use super::split::Partitions;
use super::{column_values, EtlError};
use crate::schema::TARGET;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PriceStats {
    pub mean: f64,
    pub median: f64,
    pub min: f64,
    pub max: f64,
}

impl PriceStats {
    /// Summary of the non-NaN values; `None` when there are none.
    pub fn from_values(values: &[f64]) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| !v.is_nan()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let n = sorted.len();
        let median = if n % 2 == 1 {
            sorted[n / 2]
        } else {
            (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0
        };

        Some(Self {
            mean: sorted.iter().sum::<f64>() / n as f64,
            median,
            min: sorted[0],
            max: sorted[n - 1],
        })
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMetadata {
    pub timestamp: String,
    pub total_records: usize,
    pub train_records: usize,
    pub val_records: usize,
    pub test_records: usize,
    pub features: Vec<String>,
    pub target: String,
    pub price_stats: PriceStats,
}

/// Describe the full (pre-split) dataset and the partition sizes.
pub fn record(
    enriched: &DataFrame,
    parts: &Partitions,
    timestamp: NaiveDateTime,
) -> Result<DatasetMetadata, EtlError> {
    let prices = column_values(enriched, TARGET)?;
    let price_stats = PriceStats::from_values(&prices).unwrap_or(PriceStats {
        mean: f64::NAN,
        median: f64::NAN,
        min: f64::NAN,
        max: f64::NAN,
    });

    Ok(DatasetMetadata {
        timestamp: timestamp.format("%Y-%m-%dT%H:%M:%S%.6f").to_string(),
        total_records: enriched.height(),
        train_records: parts.train.height(),
        val_records: parts.val.height(),
        test_records: parts.test.height(),
        features: enriched
            .get_column_names()
            .iter()
            .filter(|name| **name != TARGET)
            .map(|name| name.to_string())
            .collect(),
        target: TARGET.to_string(),
        price_stats,
    })
}

pub fn write_metadata(meta: &DatasetMetadata, path: &Path) -> Result<(), EtlError> {
    fs::write(path, serde_json::to_string_pretty(meta)?)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::etl::split::{partition, SplitConfig};
    use polars::prelude::*;

    #[test]
    fn stats_match_pandas_conventions() {
        let stats = PriceStats::from_values(&[100.0, 400.0, 200.0, 300.0]).unwrap();
        assert_eq!(
            stats,
            PriceStats {
                mean: 250.0,
                median: 250.0,
                min: 100.0,
                max: 400.0
            }
        );

        let odd = PriceStats::from_values(&[5.0, f64::NAN, 1.0, 3.0]).unwrap();
        assert_eq!(odd.median, 3.0);
        assert!(PriceStats::from_values(&[]).is_none());
    }

    #[test]
    fn serializes_documented_fields() {
        let meta = DatasetMetadata {
            timestamp: "2026-01-07T00:00:00.000000".into(),
            total_records: 10,
            train_records: 6,
            val_records: 2,
            test_records: 2,
            features: vec!["LotArea".into()],
            target: TARGET.into(),
            price_stats: PriceStats {
                mean: 1.0,
                median: 1.0,
                min: 1.0,
                max: 1.0,
            },
        };
        let value = serde_json::to_value(&meta).unwrap();
        for key in [
            "timestamp",
            "total_records",
            "train_records",
            "val_records",
            "test_records",
            "features",
            "target",
            "price_stats",
        ] {
            assert!(value.get(key).is_some(), "missing {key}");
        }
        assert_eq!(value["price_stats"]["median"], 1.0);
    }

    #[test]
    fn record_lists_every_column_but_the_target() {
        let df = DataFrame::new(vec![
            Series::new("LotArea", (0..10).map(|i| i as f64).collect::<Vec<_>>()),
            Series::new(TARGET, (0..10).map(|i| 100.0 * (i + 1) as f64).collect::<Vec<_>>()),
            Series::new("TotalSF", (0..10).map(|i| 2.0 * i as f64).collect::<Vec<_>>()),
        ])
        .unwrap();
        let parts = partition(&df, &SplitConfig::default()).unwrap();
        let at = chrono::NaiveDate::from_ymd_opt(2026, 1, 7).unwrap().and_hms_opt(0, 0, 0).unwrap();

        let meta = record(&df, &parts, at).unwrap();
        assert_eq!(meta.features, ["LotArea", "TotalSF"]);
        assert_eq!(meta.timestamp, "2026-01-07T00:00:00.000000");
        assert_eq!((meta.train_records, meta.val_records, meta.test_records), (6, 2, 2));
        assert_eq!(meta.price_stats.median, 550.0);
    }
}
