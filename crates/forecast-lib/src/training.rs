//! Offline training run
//!
//! Examples are split in time order, the pipeline is fitted on the earlier
//! part and scored on both parts, and cross-validated R² is computed on the
//! training part. The fitted pipeline is returned for the caller to save.

use crate::dataset::chronological_split;
use crate::error::Result;
use crate::evaluation::{cross_val_r2, evaluate, mean, RegressionMetrics};
use crate::models::TrainingExample;
use crate::predictor::{EstimatorConfig, PredictionPipeline, WeatherPipeline};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::info;

/// Settings for one training run
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    #[serde(default)]
    pub estimator: EstimatorConfig,
    /// Share of the most recent examples held out for testing
    #[serde(default = "default_test_fraction")]
    pub test_fraction: f64,
    /// Cross-validation folds over the training part; 0 disables it
    #[serde(default = "default_cv_folds")]
    pub cv_folds: usize,
}

fn default_test_fraction() -> f64 {
    0.2
}

fn default_cv_folds() -> usize {
    5
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            estimator: EstimatorConfig::default(),
            test_fraction: default_test_fraction(),
            cv_folds: default_cv_folds(),
        }
    }
}

/// Fitted pipeline with its scores on both parts of the split
#[derive(Debug, Clone)]
pub struct TrainingOutcome {
    pub pipeline: WeatherPipeline,
    pub train_metrics: RegressionMetrics,
    pub test_metrics: RegressionMetrics,
    /// Per-fold R²; empty when cross-validation is disabled
    pub cv_r2: Vec<f64>,
}

impl TrainingOutcome {
    /// Mean cross-validated R², `None` when cross-validation was disabled
    pub fn cv_r2_mean(&self) -> Option<f64> {
        (!self.cv_r2.is_empty()).then(|| mean(&self.cv_r2))
    }
}

/// Trains and scores a pipeline for one configuration
pub struct Trainer {
    config: TrainingConfig,
}

impl Trainer {
    pub fn new(config: TrainingConfig) -> Self {
        Self { config }
    }

    /// Train on `examples`, which must be in time order.
    ///
    /// Fails with `InsufficientData` when the split leaves either part empty.
    pub fn run(&self, examples: &[TrainingExample]) -> Result<TrainingOutcome> {
        let start = Instant::now();
        let (train, test) = chronological_split(examples, self.config.test_fraction)?;
        let unfitted = PredictionPipeline::new(self.config.estimator.build()?);

        info!(
            algorithm = ?self.config.estimator.algorithm,
            train = train.len(),
            test = test.len(),
            "Training started"
        );
        let pipeline = unfitted.fit(train)?;
        let train_metrics = evaluate(&pipeline, train)?;
        let test_metrics = evaluate(&pipeline, test)?;

        let cv_r2 = if self.config.cv_folds > 0 {
            cross_val_r2(&unfitted, train, self.config.cv_folds)?
        } else {
            Vec::new()
        };

        let outcome = TrainingOutcome {
            pipeline,
            train_metrics,
            test_metrics,
            cv_r2,
        };
        info!(
            train_mae = outcome.train_metrics.mae,
            test_mae = outcome.test_metrics.mae,
            test_r2 = outcome.test_metrics.r2,
            cv_r2 = ?outcome.cv_r2_mean(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Training finished"
        );
        Ok(outcome)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ForecastError;
    use crate::predictor::test_support::hourly_examples;
    use crate::predictor::{Algorithm, GradientBoostingParams};

    fn quick_config() -> TrainingConfig {
        TrainingConfig {
            estimator: EstimatorConfig {
                algorithm: Algorithm::GradientBoosting,
                gradient_boosting: GradientBoostingParams {
                    n_estimators: 50,
                    learning_rate: 0.1,
                    ..Default::default()
                },
                ..Default::default()
            },
            cv_folds: 3,
            ..Default::default()
        }
    }

    #[test]
    fn test_run_scores_both_splits() {
        let outcome = Trainer::new(quick_config()).run(&hourly_examples(24 * 6)).unwrap();
        assert!(outcome.pipeline.is_fitted());
        assert_eq!(outcome.pipeline.metadata().unwrap().n_examples, 115);
        assert_eq!(outcome.test_metrics.samples, 29);
        assert_eq!(outcome.cv_r2.len(), 3);
        assert!(outcome.train_metrics.mae < 0.5);
        assert!(outcome.cv_r2_mean().unwrap().is_finite());
    }

    #[test]
    fn test_cv_can_be_disabled() {
        let config = TrainingConfig {
            cv_folds: 0,
            ..quick_config()
        };
        let outcome = Trainer::new(config).run(&hourly_examples(48)).unwrap();
        assert!(outcome.cv_r2.is_empty());
        assert_eq!(outcome.cv_r2_mean(), None);
    }

    #[test]
    fn test_empty_examples_rejected() {
        assert!(matches!(
            Trainer::new(quick_config()).run(&[]),
            Err(ForecastError::InsufficientData(_))
        ));
    }

    #[test]
    fn test_config_defaults_from_json() {
        let config: TrainingConfig = serde_json::from_str(r#"{"cv_folds": 2}"#).unwrap();
        assert_eq!(config.test_fraction, 0.2);
        assert_eq!(config.cv_folds, 2);
        assert_eq!(config.estimator.gradient_boosting.n_estimators, 300);
    }
}
