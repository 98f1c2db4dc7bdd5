//! Forecast service library: configuration and the HTTP API

pub mod api;
pub mod config;
