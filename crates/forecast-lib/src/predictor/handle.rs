//! Lazily loaded, shared pipeline for the serving layer

use super::pipeline::WeatherPipeline;
use super::store::ModelStore;
use crate::error::{ForecastError, Result};
use crate::models::{RawObservation, RowPrediction};
use once_cell::sync::OnceCell;
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

/// Loads the pipeline from its store at most once and hands out shared
/// references afterwards.
///
/// Concurrent first callers block on the same initialization. A failed
/// load leaves the handle empty so the next caller retries.
#[derive(Debug)]
pub struct PipelineHandle {
    store: Option<ModelStore>,
    cell: OnceCell<Arc<WeatherPipeline>>,
}

impl PipelineHandle {
    pub fn new(store: ModelStore) -> Self {
        Self {
            store: Some(store),
            cell: OnceCell::new(),
        }
    }

    /// Handle around an already fitted in-memory pipeline
    pub fn from_pipeline(pipeline: WeatherPipeline) -> Self {
        Self {
            store: None,
            cell: OnceCell::with_value(Arc::new(pipeline)),
        }
    }

    pub fn artifact_path(&self) -> Option<&Path> {
        self.store.as_ref().map(|s| s.path())
    }

    pub fn is_loaded(&self) -> bool {
        self.cell.get().is_some()
    }

    /// The shared pipeline, loading it on first use
    pub fn get(&self) -> Result<Arc<WeatherPipeline>> {
        self.cell
            .get_or_try_init(|| {
                let store = self.store.as_ref().ok_or(ForecastError::NotFitted)?;
                match store.load() {
                    Ok(pipeline) => {
                        info!(path = %store.path().display(), "Pipeline ready for serving");
                        Ok(Arc::new(pipeline))
                    }
                    Err(e) => {
                        warn!(path = %store.path().display(), error = %e, "Pipeline load failed");
                        Err(e)
                    }
                }
            })
            .cloned()
    }

    /// Load eagerly, e.g. at startup
    pub fn preload(&self) -> Result<()> {
        self.get().map(|_| ())
    }

    pub fn predict_row(&self, raw: &RawObservation) -> Result<RowPrediction> {
        self.get()?.predict_row(raw)
    }
}
