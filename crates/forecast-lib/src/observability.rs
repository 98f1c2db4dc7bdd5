//! Observability infrastructure for the forecaster
//!
//! Provides:
//! - Prometheus metrics (prediction latency, prediction and source errors, model info)
//! - Event-style structured logging with tracing

use prometheus::{
    register_gauge_vec, register_histogram, register_int_counter, register_int_counter_vec,
    register_int_gauge, GaugeVec, Histogram, IntCounter, IntCounterVec, IntGauge,
};
use std::sync::OnceLock;
use tracing::{info, warn};

/// Latency buckets in seconds; one prediction is a few hundred tree lookups
const LATENCY_BUCKETS: &[f64] = &[
    0.00005, 0.0001, 0.00025, 0.0005, 0.001, 0.0025, 0.005, 0.01, 0.05, 0.25, 1.0,
];

static GLOBAL_METRICS: OnceLock<ForecastMetricsInner> = OnceLock::new();

struct ForecastMetricsInner {
    prediction_latency_seconds: Histogram,
    predictions_total: IntCounter,
    prediction_errors: IntCounterVec,
    source_errors: IntCounter,
    model_loaded: IntGauge,
    model_info: GaugeVec,
}

impl ForecastMetricsInner {
    fn new() -> Self {
        Self {
            prediction_latency_seconds: register_histogram!(
                "forecast_prediction_latency_seconds",
                "Time spent computing one next-hour prediction",
                LATENCY_BUCKETS.to_vec()
            )
            .expect("Failed to register prediction_latency_seconds"),

            predictions_total: register_int_counter!(
                "forecast_predictions_total",
                "Total number of predictions served"
            )
            .expect("Failed to register predictions_total"),

            prediction_errors: register_int_counter_vec!(
                "forecast_prediction_errors_total",
                "Failed prediction requests by error kind",
                &["kind"]
            )
            .expect("Failed to register prediction_errors"),

            source_errors: register_int_counter!(
                "forecast_source_errors_total",
                "Failed requests to the weather provider"
            )
            .expect("Failed to register source_errors"),

            model_loaded: register_int_gauge!(
                "forecast_model_loaded",
                "1 when the pipeline artifact is loaded"
            )
            .expect("Failed to register model_loaded"),

            model_info: register_gauge_vec!(
                "forecast_model_info",
                "Information about the loaded pipeline",
                &["algorithm", "transform_version"]
            )
            .expect("Failed to register model_info"),
        }
    }
}

/// Handle to the process-wide forecaster metrics.
///
/// Clones share the same underlying collectors in the default registry.
#[derive(Clone)]
pub struct ForecastMetrics {
    inner: &'static ForecastMetricsInner,
}

impl Default for ForecastMetrics {
    fn default() -> Self {
        Self::new()
    }
}

impl ForecastMetrics {
    /// Handle to the global metrics, registering them on first use
    pub fn new() -> Self {
        Self {
            inner: GLOBAL_METRICS.get_or_init(ForecastMetricsInner::new),
        }
    }

    /// Record the time spent on one prediction
    pub fn observe_prediction_latency(&self, duration_secs: f64) {
        self.inner.prediction_latency_seconds.observe(duration_secs);
    }

    /// Count a successful prediction
    pub fn inc_predictions(&self) {
        self.inner.predictions_total.inc();
    }

    /// Count a failed prediction by error kind
    pub fn inc_prediction_errors(&self, kind: &str) {
        self.inner.prediction_errors.with_label_values(&[kind]).inc();
    }

    /// Count a failed request to the weather provider
    pub fn inc_source_errors(&self) {
        self.inner.source_errors.inc();
    }

    /// Record the loaded pipeline; replaces any previous info series
    pub fn set_model_loaded(&self, algorithm: &str, transform_version: u32) {
        self.inner.model_loaded.set(1);
        self.inner.model_info.reset();
        self.inner
            .model_info
            .with_label_values(&[algorithm, &transform_version.to_string()])
            .set(1.0);
    }
}

/// Structured logger for forecaster events
///
/// Every record carries an `event` name and the site it was produced for.
#[derive(Clone)]
pub struct StructuredLogger {
    site: String,
}

impl StructuredLogger {
    pub fn new(site: impl Into<String>) -> Self {
        Self { site: site.into() }
    }

    /// Log a served forecast
    ///
    /// `origin` is `live` for provider data or `request` for caller data
    pub fn log_prediction(&self, origin: &str, timestamp_used: &str, predicted_temp: f64) {
        info!(
            event = "prediction_generated",
            site = %self.site,
            origin = %origin,
            timestamp_used = %timestamp_used,
            predicted_temp = predicted_temp,
            "Generated next-hour forecast"
        );
    }

    /// Log a failed prediction request
    pub fn log_prediction_failed(&self, origin: &str, kind: &str, error: &str) {
        warn!(
            event = "prediction_failed",
            site = %self.site,
            origin = %origin,
            kind = %kind,
            error = %error,
            "Prediction failed"
        );
    }

    /// Log a pipeline artifact becoming available to the service
    pub fn log_model_loaded(&self, path: &str, algorithm: &str, n_examples: usize) {
        info!(
            event = "model_loaded",
            site = %self.site,
            path = %path,
            algorithm = %algorithm,
            n_examples = n_examples,
            "Pipeline artifact loaded"
        );
    }

    /// Log the metrics of a finished training run
    pub fn log_training_completed(
        &self,
        algorithm: &str,
        examples: usize,
        test_mae: f64,
        test_r2: f64,
        cv_r2: Option<f64>,
    ) {
        info!(
            event = "training_completed",
            site = %self.site,
            algorithm = %algorithm,
            examples = examples,
            test_mae = test_mae,
            test_r2 = test_r2,
            cv_r2 = ?cv_r2,
            "Training completed"
        );
    }

    /// Log an evaluation gate decision, as a warning when rejected
    pub fn log_evaluation_completed(&self, mae: f64, rmse: f64, r2: f64, passed: bool) {
        if passed {
            info!(
                event = "evaluation_completed",
                site = %self.site,
                mae = mae,
                rmse = rmse,
                r2 = r2,
                passed = true,
                "Model evaluation passed"
            );
        } else {
            warn!(
                event = "evaluation_completed",
                site = %self.site,
                mae = mae,
                rmse = rmse,
                r2 = r2,
                passed = false,
                "Model rejected by evaluation gate"
            );
        }
    }

    /// Log a live collector run
    pub fn log_observation_collected(&self, timestamp: &str, appended: bool) {
        info!(
            event = "observation_collected",
            site = %self.site,
            timestamp = %timestamp,
            appended = appended,
            "Collected live observation"
        );
    }

    /// Log service startup
    pub fn log_startup(&self, version: &str, model_path: &str) {
        info!(
            event = "service_started",
            site = %self.site,
            service_version = %version,
            model_path = %model_path,
            "Forecast service started"
        );
    }

    /// Log service shutdown
    pub fn log_shutdown(&self, reason: &str) {
        info!(
            event = "service_shutdown",
            site = %self.site,
            reason = %reason,
            "Forecast service shutting down"
        );
    }
}
