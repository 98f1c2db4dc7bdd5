//! HTTP API: forecasts, health checks and Prometheus metrics
//!
//! Prediction endpoints never leak error details. Every failure is logged
//! and answered with `500 {"detail": "Prediction failed"}`.

use anyhow::Context;
use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use forecast_lib::{
    health::{components, HealthRegistry},
    observability::{ForecastMetrics, StructuredLogger},
    predictor::Estimator,
    ForecastError, PipelineHandle, RawObservation, WeatherSource,
};
use prometheus::{Encoder, TextEncoder};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info};

/// Shared application state
pub struct AppState {
    pub health_registry: HealthRegistry,
    pub metrics: ForecastMetrics,
    pub logger: StructuredLogger,
    pub pipeline: Arc<PipelineHandle>,
    pub source: Arc<dyn WeatherSource>,
}

impl AppState {
    pub fn new(
        health_registry: HealthRegistry,
        metrics: ForecastMetrics,
        logger: StructuredLogger,
        pipeline: Arc<PipelineHandle>,
        source: Arc<dyn WeatherSource>,
    ) -> Self {
        Self {
            health_registry,
            metrics,
            logger,
            pipeline,
            source,
        }
    }
}

/// Body of a successful prediction
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PredictionResponse {
    pub predicted_temp: f64,
    pub timestamp_used: String,
}

fn prediction_failed() -> Response {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(serde_json::json!({ "detail": "Prediction failed" })),
    )
        .into_response()
}

fn round2(value: f64) -> f64 {
    (value * 100.0).round() / 100.0
}

/// Record an artifact failure on the model component. A missing artifact
/// only degrades it since the handle retries on the next request.
async fn mark_model_failed(state: &AppState, e: &ForecastError) {
    match e {
        ForecastError::ArtifactNotFound(_) => {
            state
                .health_registry
                .set_degraded(components::MODEL, e.to_string())
                .await
        }
        ForecastError::ArtifactCorrupt { .. } => {
            state
                .health_registry
                .set_unhealthy(components::MODEL, e.to_string())
                .await
        }
        _ => {}
    }
}

/// Load the pipeline off the async runtime and record it in health and
/// metrics. A corrupt artifact marks the model component unhealthy.
pub async fn load_model(state: &AppState) -> anyhow::Result<()> {
    let handle = state.pipeline.clone();
    let loaded = tokio::task::spawn_blocking(move || handle.get())
        .await
        .context("Model load task failed")?;

    match loaded {
        Ok(pipeline) => {
            let algorithm = pipeline.estimator().algorithm();
            let n_examples = pipeline.metadata().map_or(0, |m| m.n_examples);
            state
                .metrics
                .set_model_loaded(algorithm, pipeline.transform().version());
            state.health_registry.set_healthy(components::MODEL).await;
            let path = state
                .pipeline
                .artifact_path()
                .map(|p| p.display().to_string())
                .unwrap_or_else(|| "<memory>".to_string());
            state.logger.log_model_loaded(&path, algorithm, n_examples);
            Ok(())
        }
        Err(e) => {
            mark_model_failed(state, &e).await;
            Err(anyhow::Error::new(e).context("Failed to load pipeline artifact"))
        }
    }
}

async fn run_prediction(state: &AppState, raw: RawObservation, origin: &str) -> Response {
    let was_loaded = state.pipeline.is_loaded();
    let handle = state.pipeline.clone();
    let start = Instant::now();
    let result = tokio::task::spawn_blocking(move || handle.predict_row(&raw)).await;

    let outcome = match result {
        Ok(outcome) => outcome,
        Err(e) => {
            error!(error = %e, "Prediction task failed");
            state.metrics.inc_prediction_errors("internal");
            return prediction_failed();
        }
    };

    // The request may have loaded the pipeline even when the prediction
    // itself failed
    if !was_loaded && state.pipeline.is_loaded() {
        if let Err(e) = load_model(state).await {
            error!(error = %format!("{:#}", e), "Failed to record loaded model");
        }
    }

    match outcome {
        Ok(prediction) => {
            state
                .metrics
                .observe_prediction_latency(start.elapsed().as_secs_f64());
            state.metrics.inc_predictions();

            let body = PredictionResponse {
                predicted_temp: round2(prediction.predicted_temp),
                timestamp_used: prediction.timestamp_used,
            };
            state
                .logger
                .log_prediction(origin, &body.timestamp_used, body.predicted_temp);
            Json(body).into_response()
        }
        Err(e) => {
            mark_model_failed(state, &e).await;
            state.metrics.inc_prediction_errors(e.kind());
            state
                .logger
                .log_prediction_failed(origin, e.kind(), &e.to_string());
            prediction_failed()
        }
    }
}

async fn health() -> impl IntoResponse {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Health check response - returns 200 if healthy, 503 if degraded/unhealthy
async fn healthz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let health = state.health_registry.health().await;

    let status_code = if health.status.is_operational() {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(health))
}

async fn readyz(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let readiness = state.health_registry.readiness().await;

    let status_code = if readiness.ready {
        StatusCode::OK
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    };

    (status_code, Json(readiness))
}

async fn metrics() -> Response {
    let encoder = TextEncoder::new();
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!(error = %e, "Failed to encode metrics");
        return StatusCode::INTERNAL_SERVER_ERROR.into_response();
    }

    (
        StatusCode::OK,
        [("content-type", "text/plain; charset=utf-8")],
        buffer,
    )
        .into_response()
}

/// Forecast from the provider's current-hour observation
async fn predict_live(State(state): State<Arc<AppState>>) -> Response {
    let raw = match state.source.latest().await {
        Ok(raw) => {
            state
                .health_registry
                .set_healthy(components::WEATHER_SOURCE)
                .await;
            raw
        }
        Err(e) => {
            let detail = format!("{:#}", e);
            state.metrics.inc_source_errors();
            state.metrics.inc_prediction_errors("source");
            state
                .health_registry
                .set_degraded(components::WEATHER_SOURCE, detail.clone())
                .await;
            state.logger.log_prediction_failed("live", "source", &detail);
            return prediction_failed();
        }
    };

    run_prediction(&state, raw, "live").await
}

/// Forecast from a caller-supplied observation
async fn predict(
    State(state): State<Arc<AppState>>,
    body: Result<Json<RawObservation>, JsonRejection>,
) -> Response {
    match body {
        Ok(Json(raw)) => run_prediction(&state, raw, "request").await,
        Err(rejection) => {
            state.metrics.inc_prediction_errors("bad_request");
            state
                .logger
                .log_prediction_failed("request", "bad_request", &rejection.body_text());
            prediction_failed()
        }
    }
}

/// Create the API router
pub fn create_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/healthz", get(healthz))
        .route("/readyz", get(readyz))
        .route("/metrics", get(metrics))
        .route("/predict-live", get(predict_live))
        .route("/predict", post(predict))
        .with_state(state)
}

/// Start the API server
pub async fn serve(port: u16, state: Arc<AppState>) -> anyhow::Result<()> {
    let app = create_router(state);

    let addr = format!("0.0.0.0:{}", port);
    info!(addr = %addr, "Starting API server");

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
