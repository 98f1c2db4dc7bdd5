//! Error types for the prediction core
//!
//! The transform, pipeline and model store report failures through
//! [`ForecastError`]. Collaborators around the core (weather source,
//! dataset files, binaries) use `anyhow` and wrap these where they cross.

use std::path::PathBuf;
use thiserror::Error;

/// Errors raised by the feature transform, pipeline, estimators and store
#[derive(Debug, Error)]
pub enum ForecastError {
    /// A record is missing a field, has a non-finite or out-of-range value,
    /// or carries an unparseable timestamp
    #[error("malformed observation at row {index}: {reason}")]
    MalformedInput { index: usize, reason: String },

    /// Training was requested without any usable examples
    #[error("insufficient training data: {0}")]
    InsufficientData(String),

    /// Prediction was requested before the pipeline was fitted or loaded
    #[error("pipeline has not been fitted")]
    NotFitted,

    /// Estimator hyper-parameters are out of range
    #[error("invalid estimator parameter: {0}")]
    InvalidParameter(String),

    /// The estimator failed while fitting or predicting
    #[error("estimator failure: {0}")]
    Estimator(String),

    /// No artifact exists at the configured location
    #[error("model artifact not found at {}", .0.display())]
    ArtifactNotFound(PathBuf),

    /// The artifact exists but cannot be trusted
    #[error("model artifact at {} is corrupt: {reason}", .path.display())]
    ArtifactCorrupt { path: PathBuf, reason: String },

    /// Writing the artifact failed; no partial artifact is left behind
    #[error("failed to write model artifact to {}: {source}", .path.display())]
    ArtifactWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl ForecastError {
    pub(crate) fn malformed(index: usize, reason: impl Into<String>) -> Self {
        Self::MalformedInput {
            index,
            reason: reason.into(),
        }
    }

    pub(crate) fn corrupt(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::ArtifactCorrupt {
            path: path.into(),
            reason: reason.into(),
        }
    }

    /// Short machine-readable kind, used as a log field and metric label
    pub fn kind(&self) -> &'static str {
        match self {
            Self::MalformedInput { .. } => "malformed_input",
            Self::InsufficientData(_) => "insufficient_data",
            Self::NotFitted => "not_fitted",
            Self::InvalidParameter(_) => "invalid_parameter",
            Self::Estimator(_) => "estimator",
            Self::ArtifactNotFound(_) => "artifact_not_found",
            Self::ArtifactCorrupt { .. } => "artifact_corrupt",
            Self::ArtifactWrite { .. } => "artifact_write",
        }
    }
}

pub type Result<T> = std::result::Result<T, ForecastError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_messages_name_the_problem() {
        let err = ForecastError::malformed(3, "missing field `humidity`");
        assert_eq!(
            err.to_string(),
            "malformed observation at row 3: missing field `humidity`"
        );

        let err = ForecastError::ArtifactNotFound(PathBuf::from("/tmp/model.json"));
        assert!(err.to_string().contains("/tmp/model.json"));
    }

    #[test]
    fn test_error_kinds() {
        assert_eq!(ForecastError::NotFitted.kind(), "not_fitted");
        assert_eq!(
            ForecastError::corrupt("/x", "bad checksum").kind(),
            "artifact_corrupt"
        );
    }
}
