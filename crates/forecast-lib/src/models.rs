//! Core data models for the forecaster

use crate::error::{ForecastError, Result};
use chrono::{DateTime, FixedOffset, NaiveDateTime, SecondsFormat, TimeZone, Utc};
use serde::{Deserialize, Serialize};

/// Naive layouts accepted for timestamps without an offset
const NAIVE_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
    "%Y-%m-%d %H:%M:%S%.f",
    "%Y-%m-%d %H:%M",
];

/// Offset-bearing layouts that are not strict RFC 3339
const OFFSET_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S%.f%:z", "%Y-%m-%dT%H:%M%:z"];

/// Unvalidated observation as it arrives from CSV files, JSON bodies or the
/// weather provider. Fields are matched by name; extra fields are ignored.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawObservation {
    pub timestamp: Option<String>,
    pub temperature: Option<f64>,
    pub humidity: Option<f64>,
    pub pressure: Option<f64>,
    pub wind_speed: Option<f64>,
}

/// One validated hourly weather reading
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub timestamp: DateTime<FixedOffset>,
    /// Air temperature in °C
    pub temperature: f64,
    /// Relative humidity in percent (0-100)
    pub humidity: f64,
    /// Mean sea level pressure in hPa
    pub pressure: f64,
    /// Wind speed in m/s
    pub wind_speed: f64,
}

impl Observation {
    /// Validate a raw record. `index` is the record position reported in
    /// the error.
    pub fn from_raw(raw: &RawObservation, index: usize) -> Result<Self> {
        let stamp = raw
            .timestamp
            .as_deref()
            .ok_or_else(|| ForecastError::malformed(index, "missing field `timestamp`"))?;
        let timestamp = parse_timestamp(stamp).ok_or_else(|| {
            ForecastError::malformed(index, format!("unparseable timestamp {:?}", stamp))
        })?;

        let temperature = require(index, "temperature", raw.temperature)?;
        let humidity = require(index, "humidity", raw.humidity)?;
        let pressure = require(index, "pressure", raw.pressure)?;
        let wind_speed = require(index, "wind_speed", raw.wind_speed)?;

        if !(0.0..=100.0).contains(&humidity) {
            return Err(ForecastError::malformed(
                index,
                format!("humidity {} outside 0-100", humidity),
            ));
        }
        if wind_speed < 0.0 {
            return Err(ForecastError::malformed(
                index,
                format!("negative wind_speed {}", wind_speed),
            ));
        }

        Ok(Self {
            timestamp,
            temperature,
            humidity,
            pressure,
            wind_speed,
        })
    }

}

fn require(index: usize, field: &str, value: Option<f64>) -> Result<f64> {
    match value {
        None => Err(ForecastError::malformed(
            index,
            format!("missing field `{}`", field),
        )),
        Some(v) if !v.is_finite() => Err(ForecastError::malformed(
            index,
            format!("non-finite value for `{}`", field),
        )),
        Some(v) => Ok(v),
    }
}

/// Parse a timestamp. Offset-bearing inputs keep their offset; naive inputs
/// are taken as UTC wall-clock time.
pub fn parse_timestamp(input: &str) -> Option<DateTime<FixedOffset>> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Some(ts);
    }
    for fmt in OFFSET_FORMATS {
        if let Ok(ts) = DateTime::parse_from_str(input, fmt) {
            return Some(ts);
        }
    }
    NAIVE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDateTime::parse_from_str(input, fmt).ok())
        .map(|naive| Utc.from_utc_datetime(&naive).fixed_offset())
}

/// Canonical text form: naive ISO for UTC wall-clock, RFC 3339 otherwise
pub fn format_timestamp(ts: &DateTime<FixedOffset>) -> String {
    if ts.offset().local_minus_utc() == 0 {
        ts.format("%Y-%m-%dT%H:%M:%S").to_string()
    } else {
        ts.to_rfc3339_opts(SecondsFormat::Secs, false)
    }
}

/// Model-ready features derived from one observation.
///
/// Field order is the feature schema; see [`crate::predictor::FEATURE_NAMES`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct FeatureVector {
    pub temperature: f64,
    pub humidity: f64,
    pub pressure: f64,
    pub wind_speed: f64,
    pub hour: u32,
    /// Monday = 0 .. Sunday = 6
    pub weekday: u32,
    pub month: u32,
}

/// An observation labelled with the temperature one hour later
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrainingExample {
    pub observation: Observation,
    pub target: f64,
}

/// Output of a single-row prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RowPrediction {
    pub predicted_temp: f64,
    pub timestamp_used: String,
}
