//! Feature transform + estimator behind one fit/predict lifecycle

use super::estimator::{Estimator, EstimatorModel};
use super::features::{FeatureRow, FeatureTransform};
use crate::error::{ForecastError, Result};
use crate::models::{format_timestamp, Observation, RawObservation, RowPrediction, TrainingExample};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Instant;
use tracing::{debug, info};

/// The pipeline type used by the binaries
pub type WeatherPipeline = PredictionPipeline<EstimatorModel>;

/// Facts recorded when a pipeline is fitted
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FitMetadata {
    pub algorithm: String,
    pub n_examples: usize,
    pub fitted_at: DateTime<Utc>,
}

/// A feature transform paired with a regression estimator.
///
/// Fitting never mutates an existing pipeline; it returns a new one.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PredictionPipeline<E> {
    transform: FeatureTransform,
    estimator: E,
    #[serde(default)]
    metadata: Option<FitMetadata>,
}

impl<E: Estimator> PredictionPipeline<E> {
    /// Unfitted pipeline around `estimator` using the current transform
    pub fn new(estimator: E) -> Self {
        Self {
            transform: FeatureTransform::current(),
            estimator,
            metadata: None,
        }
    }

    pub fn transform(&self) -> &FeatureTransform {
        &self.transform
    }

    pub fn estimator(&self) -> &E {
        &self.estimator
    }

    pub fn metadata(&self) -> Option<&FitMetadata> {
        self.metadata.as_ref()
    }

    pub fn is_fitted(&self) -> bool {
        self.metadata.is_some() && self.estimator.is_fitted()
    }

    /// Fit on `examples` and return the fitted pipeline
    pub fn fit(&self, examples: &[TrainingExample]) -> Result<Self> {
        if examples.is_empty() {
            return Err(ForecastError::InsufficientData(
                "at least one training example is required".to_string(),
            ));
        }

        let mut features: Vec<FeatureRow> = Vec::with_capacity(examples.len());
        let mut targets = Vec::with_capacity(examples.len());
        for (index, example) in examples.iter().enumerate() {
            if !example.target.is_finite() {
                return Err(ForecastError::malformed(index, "non-finite target"));
            }
            features.push(self.transform.row(&example.observation));
            targets.push(example.target);
        }

        let start = Instant::now();
        let estimator = self.estimator.fit(&features, &targets)?;
        info!(
            algorithm = estimator.algorithm(),
            examples = examples.len(),
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Pipeline fitted"
        );

        Ok(Self {
            transform: self.transform.clone(),
            metadata: Some(FitMetadata {
                algorithm: estimator.algorithm().to_string(),
                n_examples: examples.len(),
                fitted_at: Utc::now(),
            }),
            estimator,
        })
    }

    /// Forecast the temperature one hour after `raw`'s timestamp
    pub fn predict(&self, raw: &RawObservation) -> Result<f64> {
        self.ensure_fitted()?;
        let obs = Observation::from_raw(raw, 0)?;
        self.predict_observation(&obs)
    }

    /// Forecast from an already validated observation
    pub fn predict_observation(&self, obs: &Observation) -> Result<f64> {
        self.ensure_fitted()?;
        let row = self.transform.row(obs);
        let out = self.estimator.predict(std::slice::from_ref(&row))?;
        let value = out
            .first()
            .copied()
            .ok_or_else(|| ForecastError::Estimator("estimator returned no output".to_string()))?;
        debug!(timestamp = %obs.timestamp, prediction = value, "Prediction computed");
        Ok(value)
    }

    /// Batched prediction with the same per-row contract as [`Self::predict`]
    pub fn predict_batch(&self, raws: &[RawObservation]) -> Result<Vec<f64>> {
        self.ensure_fitted()?;
        let rows: Vec<FeatureRow> = self
            .transform
            .transform(raws)?
            .iter()
            .map(|f| f.to_row())
            .collect();
        self.estimator.predict(&rows)
    }

    /// Predictions for the observations of labelled examples
    pub fn predict_examples(&self, examples: &[TrainingExample]) -> Result<Vec<f64>> {
        self.ensure_fitted()?;
        let rows: Vec<FeatureRow> = examples
            .iter()
            .map(|e| self.transform.row(&e.observation))
            .collect();
        self.estimator.predict(&rows)
    }

    /// Single-row entry point for the serving layer
    pub fn predict_row(&self, raw: &RawObservation) -> Result<RowPrediction> {
        self.ensure_fitted()?;
        let obs = Observation::from_raw(raw, 0)?;
        let predicted_temp = self.predict_observation(&obs)?;
        Ok(RowPrediction {
            predicted_temp,
            timestamp_used: format_timestamp(&obs.timestamp),
        })
    }

    fn ensure_fitted(&self) -> Result<()> {
        if self.is_fitted() {
            Ok(())
        } else {
            Err(ForecastError::NotFitted)
        }
    }
}
