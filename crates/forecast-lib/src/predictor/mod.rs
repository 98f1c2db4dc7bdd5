//! Next-hour temperature prediction engine
//!
//! [`FeatureTransform`] turns observations into the fixed feature schema,
//! [`PredictionPipeline`] couples it with an [`Estimator`], [`ModelStore`]
//! persists fitted pipelines and [`PipelineHandle`] shares one loaded
//! pipeline across request handlers.

mod estimator;
mod features;
mod handle;
mod pipeline;
mod store;

#[cfg(test)]
pub(crate) mod test_support;

pub use estimator::{
    Algorithm, Estimator, EstimatorConfig, EstimatorModel, GradientBoostingParams,
    GradientBoostingRegressor, RidgeParams, RidgeRegressor,
};
pub use features::{
    FeatureRow, FeatureTransform, FEATURE_NAMES, NUM_FEATURES, TRANSFORM_VERSION,
    WEEKDAY_CONVENTION,
};
pub use handle::PipelineHandle;
pub use pipeline::{FitMetadata, PredictionPipeline, WeatherPipeline};
pub use store::{ArtifactInfo, ModelStore, ARTIFACT_FORMAT_VERSION};
