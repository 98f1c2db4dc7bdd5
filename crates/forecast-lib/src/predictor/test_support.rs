//! Fixtures shared by predictor tests

use crate::models::{Observation, TrainingExample};
use chrono::{Duration, TimeZone, Utc};

/// Contiguous hourly examples following a smooth daily cycle
pub(crate) fn hourly_examples(n: usize) -> Vec<TrainingExample> {
    let start = Utc
        .with_ymd_and_hms(2025, 6, 1, 0, 0, 0)
        .unwrap()
        .fixed_offset();
    let temp = |i: usize| 27.0 + 6.0 * ((i % 24) as f64 / 24.0 * std::f64::consts::TAU).sin();
    (0..n)
        .map(|i| TrainingExample {
            observation: Observation {
                timestamp: start + Duration::hours(i as i64),
                temperature: temp(i),
                humidity: 55.0 + (i % 10) as f64,
                pressure: 1006.0 + (i % 5) as f64,
                wind_speed: 3.0 + (i % 4) as f64,
            },
            target: temp(i + 1),
        })
        .collect()
}
