//! Feature transform shared by training and serving
//!
//! Maps raw observations to the fixed seven-column feature layout. The
//! transform has no fitted state; its definition (schema, version, weekday
//! convention) is serialized into the model artifact and checked on load so
//! a model can never be served with features computed differently from the
//! ones it was trained on.

use crate::error::Result;
use crate::models::{FeatureVector, Observation, RawObservation};
use chrono::{Datelike, Timelike};
use serde::{Deserialize, Serialize};

/// Number of input features expected by every estimator
pub const NUM_FEATURES: usize = 7;

/// Feature schema, in column order
pub const FEATURE_NAMES: [&str; NUM_FEATURES] = [
    "temperature",
    "humidity",
    "pressure",
    "wind_speed",
    "hour",
    "weekday",
    "month",
];

/// Bumped whenever the derivation of any feature changes
pub const TRANSFORM_VERSION: u32 = 1;

/// Weekday numbering used for the `weekday` feature
pub const WEEKDAY_CONVENTION: &str = "monday=0";

/// One feature vector laid out as estimator input
pub type FeatureRow = [f64; NUM_FEATURES];

impl FeatureVector {
    pub fn to_row(&self) -> FeatureRow {
        [
            self.temperature,
            self.humidity,
            self.pressure,
            self.wind_speed,
            f64::from(self.hour),
            f64::from(self.weekday),
            f64::from(self.month),
        ]
    }
}

/// Serializable definition of the observation → feature mapping
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeatureTransform {
    version: u32,
    schema: Vec<String>,
    weekday_convention: String,
}

impl Default for FeatureTransform {
    fn default() -> Self {
        Self::current()
    }
}

impl FeatureTransform {
    /// The transform compiled into this build
    pub fn current() -> Self {
        Self {
            version: TRANSFORM_VERSION,
            schema: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            weekday_convention: WEEKDAY_CONVENTION.to_string(),
        }
    }

    pub fn version(&self) -> u32 {
        self.version
    }

    /// Ordered feature names
    pub fn schema(&self) -> &[String] {
        &self.schema
    }

    /// Describe why a stored definition differs from this one
    pub fn mismatch(&self, stored: &FeatureTransform) -> Option<String> {
        if stored.schema != self.schema {
            return Some(format!(
                "feature schema {:?} does not match {:?}",
                stored.schema, self.schema
            ));
        }
        if stored.version != self.version {
            return Some(format!(
                "transform version {} does not match {}",
                stored.version, self.version
            ));
        }
        if stored.weekday_convention != self.weekday_convention {
            return Some(format!(
                "weekday convention {:?} does not match {:?}",
                stored.weekday_convention, self.weekday_convention
            ));
        }
        None
    }

    /// Transform a batch of raw records, preserving order. The first
    /// malformed record aborts the batch.
    pub fn transform(&self, records: &[RawObservation]) -> Result<Vec<FeatureVector>> {
        records
            .iter()
            .enumerate()
            .map(|(index, raw)| {
                Observation::from_raw(raw, index).map(|obs| self.features(&obs))
            })
            .collect()
    }

    /// Transform a single raw record
    pub fn transform_one(&self, record: &RawObservation) -> Result<FeatureVector> {
        Observation::from_raw(record, 0).map(|obs| self.features(&obs))
    }

    /// Derive features from a validated observation. Every path into the
    /// estimator goes through here.
    pub fn features(&self, obs: &Observation) -> FeatureVector {
        let ts = obs.timestamp;
        FeatureVector {
            temperature: obs.temperature,
            humidity: obs.humidity,
            pressure: obs.pressure,
            wind_speed: obs.wind_speed,
            hour: ts.hour(),
            weekday: ts.weekday().num_days_from_monday(),
            month: ts.month(),
        }
    }

    /// Features of a validated observation as an estimator row
    pub fn row(&self, obs: &Observation) -> FeatureRow {
        self.features(obs).to_row()
    }
}
