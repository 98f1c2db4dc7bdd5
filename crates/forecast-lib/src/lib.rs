//! Next-hour temperature forecasting library
//!
//! This crate provides the core functionality for:
//! - Feature derivation shared by training and serving
//! - Pluggable regression estimators behind one prediction pipeline
//! - Validated, atomic model artifact storage
//! - Observation datasets, training and evaluation
//! - The Open-Meteo weather source
//! - Health checks and observability

pub mod dataset;
pub mod error;
pub mod evaluation;
pub mod health;
pub mod models;
pub mod observability;
pub mod predictor;
pub mod source;
pub mod training;

pub use error::{ForecastError, Result};
pub use health::{
    ComponentHealth, ComponentStatus, HealthRegistry, HealthResponse, ReadinessResponse,
};
pub use models::*;
pub use observability::{ForecastMetrics, StructuredLogger};
pub use predictor::{
    FeatureTransform, ModelStore, PipelineHandle, PredictionPipeline, WeatherPipeline,
};
pub use source::{OpenMeteoClient, WeatherSource};
