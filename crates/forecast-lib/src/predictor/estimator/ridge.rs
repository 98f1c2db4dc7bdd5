//! Ridge regression on standardized features

use super::{check_training_set, Estimator};
use crate::error::{ForecastError, Result};
use crate::predictor::features::{FeatureRow, NUM_FEATURES};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RidgeParams {
    /// L2 penalty on the standardized coefficients
    pub alpha: f64,
}

impl Default for RidgeParams {
    fn default() -> Self {
        Self { alpha: 1.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct LinearFit {
    intercept: f64,
    means: Vec<f64>,
    scales: Vec<f64>,
    coefficients: Vec<f64>,
}

/// Linear least squares with an L2 penalty
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RidgeRegressor {
    params: RidgeParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    fit: Option<LinearFit>,
}

impl RidgeRegressor {
    pub fn new(params: RidgeParams) -> Result<Self> {
        if !(params.alpha.is_finite() && params.alpha >= 0.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "alpha {} must be finite and non-negative",
                params.alpha
            )));
        }
        Ok(Self { params, fit: None })
    }

    /// Coefficients on the standardized scale, in schema order
    pub fn coefficients(&self) -> Option<&[f64]> {
        self.fit.as_ref().map(|f| f.coefficients.as_slice())
    }
}

impl Estimator for RidgeRegressor {
    fn algorithm(&self) -> &'static str {
        "ridge"
    }

    fn fit(&self, features: &[FeatureRow], targets: &[f64]) -> Result<Self> {
        check_training_set(features, targets)?;
        let n = features.len() as f64;

        let mut means = [0.0; NUM_FEATURES];
        for row in features {
            for (m, x) in means.iter_mut().zip(row) {
                *m += x / n;
            }
        }
        let mut scales = [0.0; NUM_FEATURES];
        for row in features {
            for j in 0..NUM_FEATURES {
                scales[j] += (row[j] - means[j]).powi(2) / n;
            }
        }
        for s in scales.iter_mut() {
            *s = s.sqrt();
            if *s < f64::EPSILON {
                *s = 1.0;
            }
        }
        let y_mean = targets.iter().sum::<f64>() / n;

        // Normal equations (ZᵀZ + αI) w = Zᵀ(y - ȳ)
        let mut gram = [[0.0; NUM_FEATURES]; NUM_FEATURES];
        let mut rhs = [0.0; NUM_FEATURES];
        for (row, y) in features.iter().zip(targets) {
            let z: Vec<f64> = (0..NUM_FEATURES)
                .map(|j| (row[j] - means[j]) / scales[j])
                .collect();
            for a in 0..NUM_FEATURES {
                rhs[a] += z[a] * (y - y_mean);
                for b in 0..NUM_FEATURES {
                    gram[a][b] += z[a] * z[b];
                }
            }
        }
        for (j, g) in gram.iter_mut().enumerate() {
            g[j] += self.params.alpha;
        }

        let coefficients = solve(gram, rhs).ok_or_else(|| {
            ForecastError::Estimator("normal equations are singular; raise alpha".to_string())
        })?;

        Ok(Self {
            params: self.params.clone(),
            fit: Some(LinearFit {
                intercept: y_mean,
                means: means.to_vec(),
                scales: scales.to_vec(),
                coefficients: coefficients.to_vec(),
            }),
        })
    }

    fn predict(&self, features: &[FeatureRow]) -> Result<Vec<f64>> {
        let fit = self.fit.as_ref().ok_or(ForecastError::NotFitted)?;
        if fit.means.len() != NUM_FEATURES
            || fit.scales.len() != NUM_FEATURES
            || fit.coefficients.len() != NUM_FEATURES
        {
            return Err(ForecastError::Estimator(format!(
                "linear fit does not have {} coefficients",
                NUM_FEATURES
            )));
        }
        Ok(features
            .iter()
            .map(|row| {
                fit.intercept
                    + (0..NUM_FEATURES)
                        .map(|j| fit.coefficients[j] * (row[j] - fit.means[j]) / fit.scales[j])
                        .sum::<f64>()
            })
            .collect())
    }

    fn is_fitted(&self) -> bool {
        self.fit.is_some()
    }
}

/// Gaussian elimination with partial pivoting
fn solve(
    mut a: [[f64; NUM_FEATURES]; NUM_FEATURES],
    mut b: [f64; NUM_FEATURES],
) -> Option<[f64; NUM_FEATURES]> {
    for col in 0..NUM_FEATURES {
        let pivot = (col..NUM_FEATURES)
            .max_by(|&i, &j| a[i][col].abs().total_cmp(&a[j][col].abs()))?;
        if a[pivot][col].abs() < 1e-12 {
            return None;
        }
        a.swap(col, pivot);
        b.swap(col, pivot);
        for row in col + 1..NUM_FEATURES {
            let factor = a[row][col] / a[col][col];
            for k in col..NUM_FEATURES {
                a[row][k] -= factor * a[col][k];
            }
            b[row] -= factor * b[col];
        }
    }
    let mut x = [0.0; NUM_FEATURES];
    for row in (0..NUM_FEATURES).rev() {
        let tail: f64 = (row + 1..NUM_FEATURES).map(|k| a[row][k] * x[k]).sum();
        x[row] = (b[row] - tail) / a[row][row];
    }
    Some(x)
}
