//! Configuration management for the CLI
//!
//! Optional JSON file at `~/.config/wxf/config.json`. Command-line flags
//! take precedence over file values, which take precedence over built-in
//! defaults.

use anyhow::{Context, Result};
use forecast_lib::source::{
    Location, OpenMeteoConfig, DEFAULT_ARCHIVE_URL, DEFAULT_FORECAST_URL,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

pub const DEFAULT_DATA_DIR: &str = "data";
pub const HISTORICAL_FILE: &str = "historical_weather.csv";
pub const ENGINEERED_FILE: &str = "engineered_weather.csv";
pub const LIVE_FILE: &str = "live_weather.csv";
pub const DEFAULT_MODEL_PATH: &str = "model/weather_pipeline.json";

/// CLI configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default, PartialEq)]
pub struct Config {
    pub latitude: Option<f64>,
    pub longitude: Option<f64>,
    /// Directory holding the CSV tables
    pub data_dir: Option<PathBuf>,
    pub model_path: Option<PathBuf>,
    pub forecast_url: Option<String>,
    pub archive_url: Option<String>,
}

impl Config {
    /// Load from the default location; a missing file yields defaults
    pub fn load() -> Result<Self> {
        match Self::config_path() {
            Some(path) => Self::load_from(&path),
            None => Ok(Self::default()),
        }
    }

    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let content = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file {}", path.display()))?;

        serde_json::from_str(&content).context("Failed to parse config file")
    }

    fn config_path() -> Option<PathBuf> {
        dirs_next::home_dir().map(|home| home.join(".config").join("wxf").join("config.json"))
    }

    pub fn data_dir(&self) -> PathBuf {
        self.data_dir
            .clone()
            .unwrap_or_else(|| PathBuf::from(DEFAULT_DATA_DIR))
    }

    /// `explicit` when given, else `file` inside the data directory
    pub fn data_file(&self, explicit: Option<PathBuf>, file: &str) -> PathBuf {
        explicit.unwrap_or_else(|| self.data_dir().join(file))
    }

    pub fn model_path(&self, explicit: Option<PathBuf>) -> PathBuf {
        explicit
            .or_else(|| self.model_path.clone())
            .unwrap_or_else(|| PathBuf::from(DEFAULT_MODEL_PATH))
    }

    pub fn location(&self) -> Location {
        let default = Location::default();
        Location {
            latitude: self.latitude.unwrap_or(default.latitude),
            longitude: self.longitude.unwrap_or(default.longitude),
        }
    }

    pub fn open_meteo(&self) -> OpenMeteoConfig {
        OpenMeteoConfig {
            forecast_url: self
                .forecast_url
                .clone()
                .unwrap_or_else(|| DEFAULT_FORECAST_URL.to_string()),
            archive_url: self
                .archive_url
                .clone()
                .unwrap_or_else(|| DEFAULT_ARCHIVE_URL.to_string()),
            location: self.location(),
            ..OpenMeteoConfig::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_missing_file_gives_defaults() {
        let dir = TempDir::new().unwrap();
        let config = Config::load_from(&dir.path().join("config.json")).unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.model_path(None), PathBuf::from(DEFAULT_MODEL_PATH));
        assert_eq!(
            config.data_file(None, LIVE_FILE),
            PathBuf::from("data").join(LIVE_FILE)
        );
        assert_eq!(config.location(), Location::HYDERABAD);
    }

    #[test]
    fn test_file_values_and_overrides() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(
            &path,
            r#"{"latitude": 12.97, "data_dir": "/var/wxf", "model_path": "/srv/model.json"}"#,
        )
        .unwrap();

        let config = Config::load_from(&path).unwrap();
        assert_eq!(config.location().latitude, 12.97);
        assert_eq!(config.location().longitude, Location::HYDERABAD.longitude);
        assert_eq!(
            config.data_file(None, HISTORICAL_FILE),
            PathBuf::from("/var/wxf").join(HISTORICAL_FILE)
        );
        assert_eq!(config.model_path(None), PathBuf::from("/srv/model.json"));
        assert_eq!(
            config.model_path(Some(PathBuf::from("other.json"))),
            PathBuf::from("other.json")
        );
    }

    #[test]
    fn test_invalid_file_is_an_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("config.json");
        std::fs::write(&path, "{ not json").unwrap();
        assert!(Config::load_from(&path).is_err());
    }
}
