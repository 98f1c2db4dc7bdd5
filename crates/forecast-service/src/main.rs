//! Forecast service - next-hour temperature predictions over HTTP
//!
//! Serves forecasts from the pipeline artifact produced by `wxf train`,
//! using Open-Meteo for live observations.

use anyhow::Result;
use forecast_lib::{
    health::{components, HealthRegistry},
    observability::{ForecastMetrics, StructuredLogger},
    ModelStore, OpenMeteoClient, PipelineHandle,
};
use forecast_service::{api, config::ServiceConfig};
use std::sync::Arc;
use tracing::{info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const SERVICE_VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing with JSON output and env filter
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().json())
        .init();

    info!("Starting forecast-service");

    let config = ServiceConfig::load()?;
    info!(
        site = %config.site_name,
        model_path = %config.model_path.display(),
        latitude = config.latitude,
        longitude = config.longitude,
        "Service configured"
    );

    let health_registry = HealthRegistry::new();
    health_registry
        .set_degraded(components::MODEL, "Model not loaded yet")
        .await;
    health_registry.register(components::WEATHER_SOURCE).await;

    let metrics = ForecastMetrics::new();
    let logger = StructuredLogger::new(&config.site_name);
    logger.log_startup(SERVICE_VERSION, &config.model_path.display().to_string());

    let pipeline = Arc::new(PipelineHandle::new(ModelStore::new(&config.model_path)));
    let source = Arc::new(OpenMeteoClient::new(config.open_meteo())?);

    let app_state = Arc::new(api::AppState::new(
        health_registry.clone(),
        metrics,
        logger.clone(),
        pipeline,
        source,
    ));

    if config.preload_model {
        // A missing artifact is not fatal: the handle retries on each request
        if let Err(e) = api::load_model(&app_state).await {
            warn!(error = %format!("{:#}", e), "Model preload failed");
        }
    }

    health_registry.set_ready(true).await;

    let api_handle = tokio::spawn(api::serve(config.api_port, app_state));

    tokio::select! {
        result = api_handle => {
            match result {
                Ok(Ok(())) => info!("API server stopped"),
                Ok(Err(e)) => return Err(e),
                Err(e) => return Err(e.into()),
            }
        }
        signal = tokio::signal::ctrl_c() => {
            signal?;
            logger.log_shutdown("SIGINT received");
        }
    }

    info!("Shutting down");
    Ok(())
}
