//! Open-Meteo forecast and archive client

use super::retry::{with_retry, RetryConfig};
use super::WeatherSource;
use crate::models::{parse_timestamp, RawObservation};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, NaiveDate, NaiveDateTime, Utc};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, info};
use url::Url;

pub const DEFAULT_FORECAST_URL: &str = "https://api.open-meteo.com/v1/forecast";
pub const DEFAULT_ARCHIVE_URL: &str = "https://archive-api.open-meteo.com/v1/archive";

/// Hourly variables requested from the provider, in feature order
pub const HOURLY_VARIABLES: &str =
    "temperature_2m,relative_humidity_2m,pressure_msl,wind_speed_10m";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

/// Geographic point the forecaster serves
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Location {
    pub latitude: f64,
    pub longitude: f64,
}

impl Location {
    pub const HYDERABAD: Location = Location {
        latitude: 17.3850,
        longitude: 78.4867,
    };
}

impl Default for Location {
    fn default() -> Self {
        Self::HYDERABAD
    }
}

#[derive(Debug, Clone)]
pub struct OpenMeteoConfig {
    pub forecast_url: String,
    pub archive_url: String,
    pub location: Location,
    pub timeout: Duration,
    pub retry: RetryConfig,
}

impl Default for OpenMeteoConfig {
    fn default() -> Self {
        Self {
            forecast_url: DEFAULT_FORECAST_URL.to_string(),
            archive_url: DEFAULT_ARCHIVE_URL.to_string(),
            location: Location::default(),
            timeout: REQUEST_TIMEOUT,
            retry: RetryConfig::default(),
        }
    }
}

/// Column-oriented hourly block of a provider response
#[derive(Debug, Clone, Deserialize)]
struct HourlyBlock {
    time: Vec<String>,
    temperature_2m: Vec<Option<f64>>,
    relative_humidity_2m: Vec<Option<f64>>,
    pressure_msl: Vec<Option<f64>>,
    wind_speed_10m: Vec<Option<f64>>,
}

/// Provider response body
#[derive(Debug, Clone, Deserialize)]
pub struct HourlyResponse {
    #[serde(default)]
    utc_offset_seconds: i64,
    hourly: HourlyBlock,
}

impl HourlyResponse {
    pub fn utc_offset_seconds(&self) -> i64 {
        self.utc_offset_seconds
    }

    /// Rows in provider order. Timestamps are kept as sent (local wall
    /// clock without offset); missing values stay `None`.
    pub fn observations(&self) -> Result<Vec<RawObservation>> {
        let h = &self.hourly;
        let n = h.time.len();
        if [
            h.temperature_2m.len(),
            h.relative_humidity_2m.len(),
            h.pressure_msl.len(),
            h.wind_speed_10m.len(),
        ]
        .iter()
        .any(|&len| len != n)
        {
            bail!("hourly arrays in provider response have different lengths");
        }

        Ok((0..n)
            .map(|i| RawObservation {
                timestamp: Some(h.time[i].clone()),
                temperature: h.temperature_2m[i],
                humidity: h.relative_humidity_2m[i],
                pressure: h.pressure_msl[i],
                wind_speed: h.wind_speed_10m[i],
            })
            .collect())
    }

    /// The last row whose wall-clock time is not after `local_now`, or the
    /// first row when every row lies in the future
    pub fn latest_at(&self, local_now: NaiveDateTime) -> Result<RawObservation> {
        let rows = self.observations()?;
        let current = rows
            .iter()
            .filter(|row| {
                row.timestamp
                    .as_deref()
                    .and_then(parse_timestamp)
                    .map_or(false, |ts| ts.naive_local() <= local_now)
            })
            .last()
            .or_else(|| rows.first())
            .cloned();
        current.context("provider response contains no hourly rows")
    }

    /// Wall-clock "now" at the response location
    pub fn local_now(&self) -> NaiveDateTime {
        Utc::now().naive_utc() + ChronoDuration::seconds(self.utc_offset_seconds)
    }
}

/// HTTP client for the Open-Meteo forecast and archive APIs
pub struct OpenMeteoClient {
    client: Client,
    config: OpenMeteoConfig,
}

impl OpenMeteoClient {
    pub fn new(config: OpenMeteoConfig) -> Result<Self> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .context("Failed to create HTTP client")?;
        Url::parse(&config.forecast_url).context("Invalid forecast URL")?;
        Url::parse(&config.archive_url).context("Invalid archive URL")?;
        Ok(Self { client, config })
    }

    /// Today's hourly forecast block at the configured location
    pub async fn forecast(&self) -> Result<HourlyResponse> {
        let url = self.url(&self.config.forecast_url, &[("forecast_days", "1".to_string())])?;
        self.fetch(url).await
    }

    /// Historical hourly rows between two dates, inclusive
    pub async fn archive(&self, start: NaiveDate, end: NaiveDate) -> Result<Vec<RawObservation>> {
        if end < start {
            bail!("archive end date {} is before start date {}", end, start);
        }
        let url = self.url(
            &self.config.archive_url,
            &[
                ("start_date", start.format("%Y-%m-%d").to_string()),
                ("end_date", end.format("%Y-%m-%d").to_string()),
            ],
        )?;
        info!(
            latitude = self.config.location.latitude,
            longitude = self.config.location.longitude,
            start = %start,
            end = %end,
            "Fetching historical weather"
        );
        let rows = self.fetch(url).await?.observations()?;
        info!(rows = rows.len(), "Historical weather fetched");
        Ok(rows)
    }

    fn url(&self, base: &str, extra: &[(&str, String)]) -> Result<Url> {
        let location = self.config.location;
        let mut params = vec![
            ("latitude", location.latitude.to_string()),
            ("longitude", location.longitude.to_string()),
            ("hourly", HOURLY_VARIABLES.to_string()),
            ("timezone", "auto".to_string()),
            ("wind_speed_unit", "ms".to_string()),
        ];
        params.extend(extra.iter().map(|(k, v)| (*k, v.clone())));
        Url::parse_with_params(base, &params).context("Invalid provider URL")
    }

    async fn fetch(&self, url: Url) -> Result<HourlyResponse> {
        debug!(url = %url, "Requesting weather data");
        let response = with_retry(&self.config.retry, || self.client.get(url.clone()).send())
            .await
            .context("Failed to reach weather provider")?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            bail!("Weather provider error ({}): {}", status, body);
        }

        response
            .json()
            .await
            .context("Failed to parse weather provider response")
    }
}

#[async_trait]
impl WeatherSource for OpenMeteoClient {
    fn name(&self) -> &str {
        "open-meteo"
    }

    async fn recent(&self) -> Result<Vec<RawObservation>> {
        self.forecast().await?.observations()
    }

    async fn latest(&self) -> Result<RawObservation> {
        let response = self.forecast().await?;
        let row = response.latest_at(response.local_now())?;
        debug!(timestamp = ?row.timestamp, "Selected latest observation");
        Ok(row)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mockito::Matcher;

    fn body() -> String {
        serde_json::json!({
            "latitude": 17.375,
            "longitude": 78.5,
            "utc_offset_seconds": 19800,
            "timezone": "Asia/Kolkata",
            "hourly": {
                "time": ["2025-07-03T00:00", "2025-07-03T01:00", "2025-07-03T02:00"],
                "temperature_2m": [26.1, 25.7, null],
                "relative_humidity_2m": [80, 82, 84],
                "pressure_msl": [1006.2, 1006.0, 1005.8],
                "wind_speed_10m": [3.2, 2.9, 2.5]
            }
        })
        .to_string()
    }

    fn client_for(server: &mockito::Server, retry: RetryConfig) -> OpenMeteoClient {
        OpenMeteoClient::new(OpenMeteoConfig {
            forecast_url: format!("{}/v1/forecast", server.url()),
            archive_url: format!("{}/v1/archive", server.url()),
            retry,
            ..Default::default()
        })
        .unwrap()
    }

    fn at(s: &str) -> NaiveDateTime {
        NaiveDateTime::parse_from_str(s, "%Y-%m-%dT%H:%M").unwrap()
    }

    #[test]
    fn test_parses_columns_into_rows() {
        let response: HourlyResponse = serde_json::from_str(&body()).unwrap();
        let rows = response.observations().unwrap();
        assert_eq!(rows.len(), 3);
        assert_eq!(rows[0].timestamp.as_deref(), Some("2025-07-03T00:00"));
        assert_eq!(rows[0].humidity, Some(80.0));
        assert_eq!(rows[2].temperature, None);
        assert_eq!(response.utc_offset_seconds(), 19800);
    }

    #[test]
    fn test_latest_picks_current_hour() {
        let response: HourlyResponse = serde_json::from_str(&body()).unwrap();
        let row = response.latest_at(at("2025-07-03T01:30")).unwrap();
        assert_eq!(row.timestamp.as_deref(), Some("2025-07-03T01:00"));

        // before the first row: fall back to it
        let row = response.latest_at(at("2025-07-02T23:00")).unwrap();
        assert_eq!(row.timestamp.as_deref(), Some("2025-07-03T00:00"));
    }

    #[test]
    fn test_ragged_arrays_rejected() {
        let json = body().replace("[3.2, 2.9, 2.5]", "[3.2]");
        let response: HourlyResponse = serde_json::from_str(&json).unwrap();
        assert!(response.observations().is_err());
    }

    #[tokio::test]
    async fn test_forecast_request_shape() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/forecast")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("latitude".into(), "17.385".into()),
                Matcher::UrlEncoded("longitude".into(), "78.4867".into()),
                Matcher::UrlEncoded("hourly".into(), HOURLY_VARIABLES.into()),
                Matcher::UrlEncoded("timezone".into(), "auto".into()),
                Matcher::UrlEncoded("forecast_days".into(), "1".into()),
            ]))
            .with_status(200)
            .with_header("content-type", "application/json")
            .with_body(body())
            .create_async()
            .await;

        let client = client_for(&server, RetryConfig::new(0, 1, 1));
        let rows = client.recent().await.unwrap();
        assert_eq!(rows.len(), 3);
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_retries_server_errors() {
        let mut server = mockito::Server::new_async().await;
        let failing = server
            .mock("GET", "/v1/forecast")
            .match_query(Matcher::Any)
            .with_status(503)
            .expect(3)
            .create_async()
            .await;

        let client = client_for(&server, RetryConfig::new(2, 1, 5));
        let err = client.latest().await.unwrap_err();
        assert!(err.to_string().contains("503"), "{}", err);
        failing.assert_async().await;
    }

    #[tokio::test]
    async fn test_client_errors_not_retried() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/forecast")
            .match_query(Matcher::Any)
            .with_status(400)
            .with_body(r#"{"error":true,"reason":"bad latitude"}"#)
            .expect(1)
            .create_async()
            .await;

        let client = client_for(&server, RetryConfig::new(3, 1, 5));
        assert!(client.recent().await.is_err());
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_archive_passes_date_range() {
        let mut server = mockito::Server::new_async().await;
        let mock = server
            .mock("GET", "/v1/archive")
            .match_query(Matcher::AllOf(vec![
                Matcher::UrlEncoded("start_date".into(), "2025-06-01".into()),
                Matcher::UrlEncoded("end_date".into(), "2025-06-02".into()),
            ]))
            .with_status(200)
            .with_body(body())
            .create_async()
            .await;

        let client = client_for(&server, RetryConfig::new(0, 1, 1));
        let start = NaiveDate::from_ymd_opt(2025, 6, 1).unwrap();
        let end = NaiveDate::from_ymd_opt(2025, 6, 2).unwrap();
        let rows = client.archive(start, end).await.unwrap();
        assert_eq!(rows.len(), 3);
        mock.assert_async().await;

        assert!(client.archive(end, start).await.is_err());
    }
}
