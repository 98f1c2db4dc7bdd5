//! Pluggable regression estimators
//!
//! The pipeline only relies on the [`Estimator`] contract. Concrete
//! algorithms are collected in [`EstimatorModel`] so a fitted model of any
//! family can be serialized into the artifact and restored by tag.

mod gradient_boosting;
mod ridge;
mod tree;

pub use gradient_boosting::{GradientBoostingParams, GradientBoostingRegressor};
pub use ridge::{RidgeParams, RidgeRegressor};

use super::features::FeatureRow;
use crate::error::{ForecastError, Result};
use serde::{Deserialize, Serialize};

/// Regression capability used by the prediction pipeline
pub trait Estimator: Send + Sync {
    /// Stable algorithm name recorded in artifacts and metrics
    fn algorithm(&self) -> &'static str;

    /// Fit on `features` against `targets`, returning a new fitted estimator
    /// with the same hyper-parameters. `self` is left untouched.
    fn fit(&self, features: &[FeatureRow], targets: &[f64]) -> Result<Self>
    where
        Self: Sized;

    /// Predict one value per row
    fn predict(&self, features: &[FeatureRow]) -> Result<Vec<f64>>;

    fn is_fitted(&self) -> bool;
}

/// Check the shape shared by every `fit` implementation
pub(crate) fn check_training_set(features: &[FeatureRow], targets: &[f64]) -> Result<()> {
    if features.is_empty() {
        return Err(ForecastError::InsufficientData(
            "estimator received no rows".to_string(),
        ));
    }
    if features.len() != targets.len() {
        return Err(ForecastError::Estimator(format!(
            "{} feature rows but {} targets",
            features.len(),
            targets.len()
        )));
    }
    Ok(())
}

/// Selectable algorithm family
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Algorithm {
    #[default]
    GradientBoosting,
    Ridge,
}

impl std::str::FromStr for Algorithm {
    type Err = String;

    fn from_str(s: &str) -> std::result::Result<Self, Self::Err> {
        match s.to_ascii_lowercase().replace('-', "_").as_str() {
            "gradient_boosting" | "gbr" => Ok(Self::GradientBoosting),
            "ridge" | "linear" => Ok(Self::Ridge),
            other => Err(format!("unknown algorithm {:?}", other)),
        }
    }
}

/// Estimator configuration: the algorithm plus the hyper-parameters of
/// every family
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EstimatorConfig {
    #[serde(default)]
    pub algorithm: Algorithm,
    #[serde(default)]
    pub gradient_boosting: GradientBoostingParams,
    #[serde(default)]
    pub ridge: RidgeParams,
}

impl EstimatorConfig {
    /// Build an unfitted estimator for the configured algorithm
    pub fn build(&self) -> Result<EstimatorModel> {
        match self.algorithm {
            Algorithm::GradientBoosting => Ok(EstimatorModel::GradientBoosting(
                GradientBoostingRegressor::new(self.gradient_boosting.clone())?,
            )),
            Algorithm::Ridge => Ok(EstimatorModel::Ridge(RidgeRegressor::new(
                self.ridge.clone(),
            )?)),
        }
    }
}

/// Serializable union of the available estimators
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "algorithm", rename_all = "snake_case")]
pub enum EstimatorModel {
    GradientBoosting(GradientBoostingRegressor),
    Ridge(RidgeRegressor),
}

impl Default for EstimatorModel {
    fn default() -> Self {
        Self::GradientBoosting(GradientBoostingRegressor::default())
    }
}

impl Estimator for EstimatorModel {
    fn algorithm(&self) -> &'static str {
        match self {
            Self::GradientBoosting(m) => m.algorithm(),
            Self::Ridge(m) => m.algorithm(),
        }
    }

    fn fit(&self, features: &[FeatureRow], targets: &[f64]) -> Result<Self> {
        match self {
            Self::GradientBoosting(m) => m.fit(features, targets).map(Self::GradientBoosting),
            Self::Ridge(m) => m.fit(features, targets).map(Self::Ridge),
        }
    }

    fn predict(&self, features: &[FeatureRow]) -> Result<Vec<f64>> {
        match self {
            Self::GradientBoosting(m) => m.predict(features),
            Self::Ridge(m) => m.predict(features),
        }
    }

    fn is_fitted(&self) -> bool {
        match self {
            Self::GradientBoosting(m) => m.is_fitted(),
            Self::Ridge(m) => m.is_fitted(),
        }
    }
}
