//! Service configuration
//!
//! Read from an optional `forecast.toml` in the working directory, then
//! from `FORECAST_*` environment variables (e.g. `FORECAST_API_PORT`).

use anyhow::{Context, Result};
use forecast_lib::source::{
    Location, OpenMeteoConfig, RetryConfig, DEFAULT_ARCHIVE_URL, DEFAULT_FORECAST_URL,
};
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Deserialize)]
pub struct ServiceConfig {
    /// Label attached to structured log events
    #[serde(default = "default_site_name")]
    pub site_name: String,

    #[serde(default = "default_api_port")]
    pub api_port: u16,

    /// Pipeline artifact written by `wxf train`
    #[serde(default = "default_model_path")]
    pub model_path: PathBuf,

    /// Load the artifact at startup instead of on the first request
    #[serde(default = "default_preload_model")]
    pub preload_model: bool,

    #[serde(default = "default_latitude")]
    pub latitude: f64,

    #[serde(default = "default_longitude")]
    pub longitude: f64,

    #[serde(default = "default_forecast_url")]
    pub forecast_url: String,

    #[serde(default = "default_archive_url")]
    pub archive_url: String,

    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
}

fn default_site_name() -> String {
    "hyderabad".to_string()
}

fn default_api_port() -> u16 {
    8080
}

fn default_model_path() -> PathBuf {
    PathBuf::from("model/weather_pipeline.json")
}

fn default_preload_model() -> bool {
    true
}

fn default_latitude() -> f64 {
    Location::HYDERABAD.latitude
}

fn default_longitude() -> f64 {
    Location::HYDERABAD.longitude
}

fn default_forecast_url() -> String {
    DEFAULT_FORECAST_URL.to_string()
}

fn default_archive_url() -> String {
    DEFAULT_ARCHIVE_URL.to_string()
}

fn default_request_timeout() -> u64 {
    10
}

fn default_max_retries() -> u32 {
    3
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            site_name: default_site_name(),
            api_port: default_api_port(),
            model_path: default_model_path(),
            preload_model: default_preload_model(),
            latitude: default_latitude(),
            longitude: default_longitude(),
            forecast_url: default_forecast_url(),
            archive_url: default_archive_url(),
            request_timeout_secs: default_request_timeout(),
            max_retries: default_max_retries(),
        }
    }
}

impl ServiceConfig {
    /// Load configuration from the optional config file and environment
    pub fn load() -> Result<Self> {
        let config = config::Config::builder()
            .add_source(config::File::with_name("forecast").required(false))
            .add_source(config::Environment::with_prefix("FORECAST").try_parsing(true))
            .build()
            .context("Failed to read configuration")?;

        config
            .try_deserialize()
            .context("Invalid forecast service configuration")
    }

    /// Weather provider settings derived from this configuration
    pub fn open_meteo(&self) -> OpenMeteoConfig {
        OpenMeteoConfig {
            forecast_url: self.forecast_url.clone(),
            archive_url: self.archive_url.clone(),
            location: Location {
                latitude: self.latitude,
                longitude: self.longitude,
            },
            timeout: Duration::from_secs(self.request_timeout_secs),
            retry: RetryConfig {
                max_retries: self.max_retries,
                ..RetryConfig::default()
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = ServiceConfig::default();
        assert_eq!(config.api_port, 8080);
        assert_eq!(config.model_path, PathBuf::from("model/weather_pipeline.json"));
        assert!(config.preload_model);
        assert_eq!(config.latitude, 17.3850);
    }

    #[test]
    fn test_partial_source_fills_defaults() {
        let config: ServiceConfig = config::Config::builder()
            .set_override("api_port", 9000)
            .unwrap()
            .set_override("model_path", "/srv/model.json")
            .unwrap()
            .build()
            .unwrap()
            .try_deserialize()
            .unwrap();
        assert_eq!(config.api_port, 9000);
        assert_eq!(config.model_path, PathBuf::from("/srv/model.json"));
        assert_eq!(config.site_name, "hyderabad");
    }

    #[test]
    fn test_open_meteo_settings() {
        let config = ServiceConfig {
            max_retries: 1,
            request_timeout_secs: 4,
            ..Default::default()
        };
        let source = config.open_meteo();
        assert_eq!(source.retry.max_retries, 1);
        assert_eq!(source.timeout, Duration::from_secs(4));
        assert_eq!(source.location, Location::HYDERABAD);
    }
}
