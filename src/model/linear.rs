//! Ordinary least squares with an intercept.
//!
//! Columns are centred and scaled before solving the normal equations; a
//! vanishing ridge term keeps exactly collinear inputs (e.g. `TotalSF` is a
//! sum of other columns) solvable.

use ndarray::{Array1, Array2, ArrayView1, ArrayView2, Axis};
use serde::{Deserialize, Serialize};

use super::FitError;

const RIDGE_EPS: f64 = 1e-8;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LinearRegression {
    pub intercept: f64,
    pub coefficients: Vec<f64>,
}

impl LinearRegression {
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>) -> Result<Self, FitError> {
        let (n, p) = x.dim();
        if n == 0 {
            return Err(FitError::EmptyTrainingSet);
        }
        if y.len() != n {
            return Err(FitError::ShapeMismatch { rows: n, targets: y.len() });
        }

        let x_mean = x.mean_axis(Axis(0)).ok_or(FitError::EmptyTrainingSet)?;
        let y_mean = y.sum() / n as f64;

        let mut z = &x - &x_mean;
        let scale: Array1<f64> = z.map_axis(Axis(0), |col| {
            let s = (col.dot(&col) / n as f64).sqrt();
            if s > 0.0 {
                s
            } else {
                1.0
            }
        });
        z /= &scale;

        let yc = &y - y_mean;
        let mut gram = z.t().dot(&z);
        for i in 0..p {
            gram[[i, i]] += RIDGE_EPS * n as f64;
        }
        let rhs = z.t().dot(&yc);

        let beta_scaled = solve(gram, rhs)?;
        let coefficients: Vec<f64> = beta_scaled.iter().zip(scale.iter()).map(|(b, s)| b / s).collect();
        let intercept = y_mean - x_mean.iter().zip(&coefficients).map(|(m, c)| m * c).sum::<f64>();

        Ok(Self {
            intercept,
            coefficients,
        })
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        let coef = ArrayView1::from(&self.coefficients[..]);
        x.dot(&coef) + self.intercept
    }

    pub fn n_features(&self) -> usize {
        self.coefficients.len()
    }
}

/// Gaussian elimination with partial pivoting.
fn solve(mut a: Array2<f64>, mut b: Array1<f64>) -> Result<Array1<f64>, FitError> {
    let n = b.len();
    for col in 0..n {
        let pivot = (col..n)
            .max_by(|&i, &j| a[[i, col]].abs().total_cmp(&a[[j, col]].abs()))
            .unwrap_or(col);
        if a[[pivot, col]].abs() < 1e-12 {
            return Err(FitError::Singular);
        }
        if pivot != col {
            for k in 0..n {
                a.swap([col, k], [pivot, k]);
            }
            b.swap(col, pivot);
        }

        for row in col + 1..n {
            let factor = a[[row, col]] / a[[col, col]];
            if factor == 0.0 {
                continue;
            }
            for k in col..n {
                a[[row, k]] -= factor * a[[col, k]];
            }
            b[row] -= factor * b[col];
        }
    }

    let mut x = Array1::zeros(n);
    for row in (0..n).rev() {
        let tail: f64 = (row + 1..n).map(|k| a[[row, k]] * x[k]).sum();
        x[row] = (b[row] - tail) / a[[row, row]];
    }
    Ok(x)
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;

    #[test]
    fn recovers_exact_plane() {
        // y = 3 + 2a - b
        let x = array![[1.0, 0.0], [2.0, 1.0], [3.0, 5.0], [4.0, 2.0], [0.0, 3.0]];
        let y = x.map_axis(Axis(1), |r| 3.0 + 2.0 * r[0] - r[1]);

        let model = LinearRegression::fit(x.view(), y.view()).unwrap();
        assert!((model.intercept - 3.0).abs() < 1e-4);
        assert!((model.coefficients[0] - 2.0).abs() < 1e-4);
        assert!((model.coefficients[1] + 1.0).abs() < 1e-4);

        let pred = model.predict(array![[10.0, 4.0]].view());
        assert!((pred[0] - 19.0).abs() < 1e-3);
    }

    #[test]
    fn tolerates_collinear_and_constant_columns() {
        // third column is the sum of the first two, fourth is constant
        let x = array![
            [1.0, 2.0, 3.0, 7.0],
            [2.0, 1.0, 3.0, 7.0],
            [3.0, 4.0, 7.0, 7.0],
            [5.0, 1.0, 6.0, 7.0],
            [4.0, 4.0, 8.0, 7.0]
        ];
        let y = x.map_axis(Axis(1), |r| 10.0 + r[2]);

        let model = LinearRegression::fit(x.view(), y.view()).unwrap();
        let pred = model.predict(x.view());
        for (p, t) in pred.iter().zip(y.iter()) {
            assert!((p - t).abs() < 1e-3, "{p} vs {t}");
        }
    }

    #[test]
    fn rejects_mismatched_target() {
        let x = array![[1.0], [2.0]];
        let y = array![1.0];
        assert!(matches!(
            LinearRegression::fit(x.view(), y.view()),
            Err(FitError::ShapeMismatch { rows: 2, targets: 1 })
        ));
    }
}
