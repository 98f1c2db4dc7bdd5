//! Gradient-boosted regression trees (least-squares loss)

use super::tree::{RegressionTree, SortedColumns, TreeBuilder, TreeLimits};
use super::{check_training_set, Estimator};
use crate::error::{ForecastError, Result};
use crate::predictor::features::FeatureRow;
use serde::{Deserialize, Serialize};
use tracing::debug;

/// Hyper-parameters for [`GradientBoostingRegressor`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostingParams {
    /// Number of boosting stages
    pub n_estimators: usize,
    /// Shrinkage applied to every stage
    pub learning_rate: f64,
    /// Maximum depth of each tree
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

impl Default for GradientBoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 300,
            learning_rate: 0.05,
            max_depth: 3,
            min_samples_split: 2,
            min_samples_leaf: 1,
        }
    }
}

impl GradientBoostingParams {
    fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(ForecastError::InvalidParameter(
                "n_estimators must be at least 1".to_string(),
            ));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate <= 1.0) {
            return Err(ForecastError::InvalidParameter(format!(
                "learning_rate {} outside (0, 1]",
                self.learning_rate
            )));
        }
        if self.min_samples_split < 2 {
            return Err(ForecastError::InvalidParameter(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        if self.min_samples_leaf == 0 {
            return Err(ForecastError::InvalidParameter(
                "min_samples_leaf must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn limits(&self) -> TreeLimits {
        TreeLimits {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct Ensemble {
    /// Initial prediction: mean of the training targets
    init: f64,
    trees: Vec<RegressionTree>,
}

/// Additive ensemble of shallow trees, each fitted to the residuals of the
/// stages before it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GradientBoostingRegressor {
    params: GradientBoostingParams,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    ensemble: Option<Ensemble>,
}

impl GradientBoostingRegressor {
    pub fn new(params: GradientBoostingParams) -> Result<Self> {
        params.validate()?;
        Ok(Self {
            params,
            ensemble: None,
        })
    }

    /// Number of fitted stages (0 when unfitted)
    pub fn n_trees(&self) -> usize {
        self.ensemble.as_ref().map_or(0, |e| e.trees.len())
    }

    fn predict_row(ensemble: &Ensemble, learning_rate: f64, row: &FeatureRow) -> f64 {
        ensemble.init
            + learning_rate * ensemble.trees.iter().map(|t| t.predict(row)).sum::<f64>()
    }
}

impl Estimator for GradientBoostingRegressor {
    fn algorithm(&self) -> &'static str {
        "gradient_boosting"
    }

    fn fit(&self, features: &[FeatureRow], targets: &[f64]) -> Result<Self> {
        self.params.validate()?;
        check_training_set(features, targets)?;

        let lr = self.params.learning_rate;
        let init = targets.iter().sum::<f64>() / targets.len() as f64;
        let mut current = vec![init; targets.len()];
        let mut residuals = vec![0.0; targets.len()];
        let sorted = SortedColumns::new(features);
        let mut trees = Vec::with_capacity(self.params.n_estimators);

        for stage in 0..self.params.n_estimators {
            for (r, (y, f)) in residuals.iter_mut().zip(targets.iter().zip(&current)) {
                *r = y - f;
            }
            let tree = TreeBuilder::new(features, &residuals, self.params.limits()).build(&sorted);
            for (f, row) in current.iter_mut().zip(features) {
                *f += lr * tree.predict(row);
            }
            trees.push(tree);

            if stage % 50 == 0 {
                let mse = targets
                    .iter()
                    .zip(&current)
                    .map(|(y, f)| (y - f).powi(2))
                    .sum::<f64>()
                    / targets.len() as f64;
                debug!(stage, train_mse = mse, "Boosting progress");
            }
        }

        Ok(Self {
            params: self.params.clone(),
            ensemble: Some(Ensemble { init, trees }),
        })
    }

    fn predict(&self, features: &[FeatureRow]) -> Result<Vec<f64>> {
        let ensemble = self.ensemble.as_ref().ok_or(ForecastError::NotFitted)?;
        if !ensemble.init.is_finite() || !ensemble.trees.iter().all(|t| t.is_well_formed()) {
            return Err(ForecastError::Estimator(
                "ensemble contains malformed trees".to_string(),
            ));
        }
        Ok(features
            .iter()
            .map(|row| Self::predict_row(ensemble, self.params.learning_rate, row))
            .collect())
    }

    fn is_fitted(&self) -> bool {
        self.ensemble.is_some()
    }
}
