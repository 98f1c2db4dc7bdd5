//! Remote observation providers

mod open_meteo;
mod retry;

pub use open_meteo::{
    HourlyResponse, Location, OpenMeteoClient, OpenMeteoConfig, DEFAULT_ARCHIVE_URL,
    DEFAULT_FORECAST_URL, HOURLY_VARIABLES,
};
pub use retry::{is_retryable_status, with_retry, RetryConfig, RetryDecision};

use crate::models::RawObservation;
use anyhow::Result;
use async_trait::async_trait;

/// Provider of recent hourly observations for the configured location
#[async_trait]
pub trait WeatherSource: Send + Sync {
    /// Short provider name for logs and health messages
    fn name(&self) -> &str;

    /// Hourly rows of the current forecast day, oldest first
    async fn recent(&self) -> Result<Vec<RawObservation>>;

    /// The row describing the current hour at the location
    async fn latest(&self) -> Result<RawObservation>;
}
