//! Regression metrics, cross-validation and the acceptance gate

use crate::error::{ForecastError, Result};
use crate::models::TrainingExample;
use crate::predictor::{Estimator, PredictionPipeline};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use tracing::{debug, error, info};

/// MAE (°C) above which a trained model is rejected
pub const DEFAULT_MAX_MAE: f64 = 0.6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    pub mae: f64,
    pub rmse: f64,
    pub r2: f64,
    pub samples: usize,
}

impl RegressionMetrics {
    pub fn compute(actual: &[f64], predicted: &[f64]) -> Result<Self> {
        if actual.is_empty() {
            return Err(ForecastError::InsufficientData(
                "no samples to score".to_string(),
            ));
        }
        if actual.len() != predicted.len() {
            return Err(ForecastError::Estimator(format!(
                "{} targets but {} predictions",
                actual.len(),
                predicted.len()
            )));
        }

        let n = actual.len() as f64;
        let mean = actual.iter().sum::<f64>() / n;
        let mut abs = 0.0;
        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        for (y, p) in actual.iter().zip(predicted) {
            abs += (y - p).abs();
            ss_res += (y - p).powi(2);
            ss_tot += (y - mean).powi(2);
        }

        // constant targets: perfect fit scores 1, anything else 0
        let r2 = if ss_tot == 0.0 {
            if ss_res == 0.0 {
                1.0
            } else {
                0.0
            }
        } else {
            1.0 - ss_res / ss_tot
        };

        Ok(Self {
            mae: abs / n,
            rmse: (ss_res / n).sqrt(),
            r2,
            samples: actual.len(),
        })
    }
}

/// Score a fitted pipeline on labelled examples
pub fn evaluate<E: Estimator>(
    pipeline: &PredictionPipeline<E>,
    examples: &[TrainingExample],
) -> Result<RegressionMetrics> {
    let predicted = pipeline.predict_examples(examples)?;
    let actual: Vec<f64> = examples.iter().map(|e| e.target).collect();
    RegressionMetrics::compute(&actual, &predicted)
}

/// Contiguous, unshuffled fold ranges; the first `n % k` folds hold one
/// extra sample
pub fn k_fold(n: usize, k: usize) -> Result<Vec<Range<usize>>> {
    if k < 2 {
        return Err(ForecastError::InvalidParameter(format!(
            "cross-validation needs at least 2 folds, got {}",
            k
        )));
    }
    if n < k {
        return Err(ForecastError::InsufficientData(format!(
            "{} examples cannot be split into {} folds",
            n, k
        )));
    }

    let (base, extra) = (n / k, n % k);
    let mut start = 0;
    Ok((0..k)
        .map(|i| {
            let len = base + usize::from(i < extra);
            let fold = start..start + len;
            start += len;
            fold
        })
        .collect())
}

/// R² of each fold when the pipeline is refitted on the remaining folds
pub fn cross_val_r2<E: Estimator>(
    pipeline: &PredictionPipeline<E>,
    examples: &[TrainingExample],
    folds: usize,
) -> Result<Vec<f64>> {
    let mut scores = Vec::with_capacity(folds);
    for (i, fold) in k_fold(examples.len(), folds)?.into_iter().enumerate() {
        let train: Vec<TrainingExample> = examples[..fold.start]
            .iter()
            .chain(&examples[fold.end..])
            .cloned()
            .collect();
        let fitted = pipeline.fit(&train)?;
        let metrics = evaluate(&fitted, &examples[fold])?;
        debug!(fold = i, r2 = metrics.r2, "Cross-validation fold scored");
        scores.push(metrics.r2);
    }
    Ok(scores)
}

pub fn mean(values: &[f64]) -> f64 {
    if values.is_empty() {
        0.0
    } else {
        values.iter().sum::<f64>() / values.len() as f64
    }
}

/// Acceptance threshold applied after training and in CI
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct EvaluationGate {
    pub max_mae: f64,
}

impl Default for EvaluationGate {
    fn default() -> Self {
        Self {
            max_mae: DEFAULT_MAX_MAE,
        }
    }
}

impl EvaluationGate {
    pub fn passes(&self, metrics: &RegressionMetrics) -> bool {
        let ok = metrics.mae <= self.max_mae;
        if ok {
            info!(mae = metrics.mae, max_mae = self.max_mae, "Model evaluation passed");
        } else {
            error!(mae = metrics.mae, max_mae = self.max_mae, "MAE too high, model rejected");
        }
        ok
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::predictor::{Algorithm, EstimatorConfig};
    use crate::predictor::test_support::hourly_examples;

    #[test]
    fn test_metrics_values() {
        let m = RegressionMetrics::compute(&[1.0, 2.0, 3.0, 4.0], &[1.0, 2.0, 3.0, 6.0]).unwrap();
        assert!((m.mae - 0.5).abs() < 1e-12);
        assert!((m.rmse - 1.0).abs() < 1e-12);
        // ss_res = 4, ss_tot = 5
        assert!((m.r2 - 0.2).abs() < 1e-12);
        assert_eq!(m.samples, 4);
    }

    #[test]
    fn test_metrics_constant_target() {
        let perfect = RegressionMetrics::compute(&[2.0, 2.0], &[2.0, 2.0]).unwrap();
        assert_eq!(perfect.r2, 1.0);
        let off = RegressionMetrics::compute(&[2.0, 2.0], &[1.0, 3.0]).unwrap();
        assert_eq!(off.r2, 0.0);
    }

    #[test]
    fn test_metrics_shape_errors() {
        assert!(matches!(
            RegressionMetrics::compute(&[], &[]),
            Err(ForecastError::InsufficientData(_))
        ));
        assert!(RegressionMetrics::compute(&[1.0], &[1.0, 2.0]).is_err());
    }

    #[test]
    fn test_k_fold_ranges() {
        let folds = k_fold(11, 5).unwrap();
        assert_eq!(folds, vec![0..3, 3..5, 5..7, 7..9, 9..11]);
        assert!(k_fold(3, 5).is_err());
        assert!(k_fold(10, 1).is_err());
    }

    #[test]
    fn test_cross_validation_scores() {
        let config = EstimatorConfig {
            algorithm: Algorithm::Ridge,
            ..Default::default()
        };
        let pipeline = PredictionPipeline::new(config.build().unwrap());
        let scores = cross_val_r2(&pipeline, &hourly_examples(24 * 5), 5).unwrap();
        assert_eq!(scores.len(), 5);
        assert!(scores.iter().all(|s| s.is_finite()));
        assert!(mean(&scores) > 0.5, "mean r2 {}", mean(&scores));
    }

    #[test]
    fn test_gate() {
        let gate = EvaluationGate::default();
        let good = RegressionMetrics { mae: 0.4, rmse: 0.5, r2: 0.99, samples: 10 };
        let bad = RegressionMetrics { mae: 0.61, ..good };
        assert!(gate.passes(&good));
        assert!(!gate.passes(&bad));
    }
}
