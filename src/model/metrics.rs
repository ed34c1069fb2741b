//! Regression evaluation metrics.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub rmse: f64,
    pub mae: f64,
    pub r2: f64,
    /// Mean absolute percentage error, in percent.
    pub mape: f64,
}

impl RegressionMetrics {
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Self {
        debug_assert_eq!(y_true.len(), y_pred.len(), "targets and predictions differ in length");
        let n = y_true.len().max(1) as f64;

        let mut sq = 0.0;
        let mut abs = 0.0;
        let mut pct = 0.0;
        for (&t, &p) in y_true.iter().zip(y_pred) {
            let err = t - p;
            sq += err * err;
            abs += err.abs();
            pct += (err / t).abs();
        }

        let mean = y_true.iter().sum::<f64>() / n;
        let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();
        // constant target: perfect fit scores 1, anything else 0
        let r2 = if ss_tot == 0.0 {
            if sq == 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            1.0 - sq / ss_tot
        };

        Self {
            rmse: (sq / n).sqrt(),
            mae: abs / n,
            r2,
            mape: pct / n * 100.0,
        }
    }

    /// `<prefix>_rmse`, `<prefix>_mae`, `<prefix>_r2`, `<prefix>_mape`.
    pub fn keyed(&self, prefix: &str) -> Vec<(String, f64)> {
        vec![
            (format!("{prefix}_rmse"), self.rmse),
            (format!("{prefix}_mae"), self.mae),
            (format!("{prefix}_r2"), self.r2),
            (format!("{prefix}_mape"), self.mape),
        ]
    }
}
