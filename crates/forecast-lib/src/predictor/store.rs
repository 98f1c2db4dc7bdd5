//! Durable storage for fitted pipelines
//!
//! An artifact is a single JSON envelope holding the serialized pipeline,
//! its SHA-256 checksum and the feature schema it was trained with. Writes
//! go to a temp file that is synced and renamed over the target, so readers
//! see either the old artifact or the complete new one.

use super::estimator::Estimator;
use super::features::FeatureTransform;
use super::pipeline::PredictionPipeline;
use crate::error::{ForecastError, Result};
use chrono::{DateTime, Utc};
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::fs::{self, File};
use std::io::{self, Write};
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Envelope layout version
pub const ARTIFACT_FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct ArtifactEnvelope {
    format_version: u32,
    feature_schema: Vec<String>,
    transform_version: u32,
    algorithm: String,
    saved_at: DateTime<Utc>,
    checksum: String,
    pipeline: String,
}

/// Envelope metadata, readable without deserializing the model
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ArtifactInfo {
    pub path: PathBuf,
    pub format_version: u32,
    pub feature_schema: Vec<String>,
    pub transform_version: u32,
    pub algorithm: String,
    pub saved_at: DateTime<Utc>,
    pub checksum: String,
    pub size_bytes: usize,
}

/// Reads and writes the pipeline artifact at one well-known path
#[derive(Debug, Clone)]
pub struct ModelStore {
    path: PathBuf,
}

impl ModelStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Persist a fitted pipeline, replacing any previous artifact
    pub fn save<E>(&self, pipeline: &PredictionPipeline<E>) -> Result<ArtifactInfo>
    where
        E: Estimator + Serialize,
    {
        if !pipeline.is_fitted() {
            return Err(ForecastError::NotFitted);
        }

        let payload = serde_json::to_string(pipeline).map_err(|e| self.write_error(e.into()))?;
        let transform = pipeline.transform();
        let envelope = ArtifactEnvelope {
            format_version: ARTIFACT_FORMAT_VERSION,
            feature_schema: transform.schema().to_vec(),
            transform_version: transform.version(),
            algorithm: pipeline.estimator().algorithm().to_string(),
            saved_at: Utc::now(),
            checksum: compute_checksum(payload.as_bytes()),
            pipeline: payload,
        };
        let bytes = serde_json::to_vec(&envelope).map_err(|e| self.write_error(e.into()))?;

        if let Some(parent) = self.path.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent).map_err(|e| self.write_error(e))?;
        }
        self.write_atomically(&bytes)?;

        info!(
            path = %self.path.display(),
            algorithm = %envelope.algorithm,
            checksum = %envelope.checksum,
            size = bytes.len(),
            "Model artifact saved"
        );

        Ok(Self::info_from(&self.path, &envelope, bytes.len()))
    }

    /// Load and validate the artifact against the running feature transform
    pub fn load<E>(&self) -> Result<PredictionPipeline<E>>
    where
        E: Estimator + DeserializeOwned,
    {
        let (envelope, size) = self.read_envelope()?;

        let computed = compute_checksum(envelope.pipeline.as_bytes());
        if computed != envelope.checksum {
            return Err(self.corrupt(format!(
                "checksum mismatch: expected {}, got {}",
                envelope.checksum, computed
            )));
        }

        let current = FeatureTransform::current();
        if envelope.feature_schema != current.schema() {
            return Err(self.corrupt(format!(
                "feature schema {:?} does not match running schema {:?}",
                envelope.feature_schema,
                current.schema()
            )));
        }

        let pipeline: PredictionPipeline<E> = serde_json::from_str(&envelope.pipeline)
            .map_err(|e| self.corrupt(format!("invalid pipeline payload: {}", e)))?;

        if let Some(reason) = current.mismatch(pipeline.transform()) {
            return Err(self.corrupt(reason));
        }
        if !pipeline.is_fitted() {
            return Err(self.corrupt("artifact holds an unfitted pipeline"));
        }

        info!(
            path = %self.path.display(),
            algorithm = %envelope.algorithm,
            saved_at = %envelope.saved_at,
            size,
            "Model artifact loaded"
        );
        Ok(pipeline)
    }

    /// Read envelope metadata only
    pub fn inspect(&self) -> Result<ArtifactInfo> {
        let (envelope, size) = self.read_envelope()?;
        Ok(Self::info_from(&self.path, &envelope, size))
    }

    fn read_envelope(&self) -> Result<(ArtifactEnvelope, usize)> {
        let bytes = match fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == io::ErrorKind::NotFound => {
                return Err(ForecastError::ArtifactNotFound(self.path.clone()))
            }
            Err(e) => return Err(self.corrupt(format!("unreadable: {}", e))),
        };

        let envelope: ArtifactEnvelope = serde_json::from_slice(&bytes)
            .map_err(|e| self.corrupt(format!("invalid envelope: {}", e)))?;
        if envelope.format_version != ARTIFACT_FORMAT_VERSION {
            return Err(self.corrupt(format!(
                "unsupported format version {}",
                envelope.format_version
            )));
        }
        Ok((envelope, bytes.len()))
    }

    fn write_atomically(&self, bytes: &[u8]) -> Result<()> {
        let temp_path = temp_path_for(&self.path);
        let result = (|| -> io::Result<()> {
            let mut file = File::create(&temp_path)?;
            file.write_all(bytes)?;
            file.sync_all()?;
            fs::rename(&temp_path, &self.path)
        })();

        if let Err(e) = result {
            if let Err(cleanup) = fs::remove_file(&temp_path) {
                if cleanup.kind() != io::ErrorKind::NotFound {
                    warn!(
                        path = %temp_path.display(),
                        error = %cleanup,
                        "Failed to remove temp artifact"
                    );
                }
            }
            return Err(self.write_error(e));
        }
        Ok(())
    }

    fn info_from(path: &Path, envelope: &ArtifactEnvelope, size_bytes: usize) -> ArtifactInfo {
        ArtifactInfo {
            path: path.to_path_buf(),
            format_version: envelope.format_version,
            feature_schema: envelope.feature_schema.clone(),
            transform_version: envelope.transform_version,
            algorithm: envelope.algorithm.clone(),
            saved_at: envelope.saved_at,
            checksum: envelope.checksum.clone(),
            size_bytes,
        }
    }

    fn corrupt(&self, reason: impl Into<String>) -> ForecastError {
        ForecastError::corrupt(&self.path, reason)
    }

    fn write_error(&self, source: io::Error) -> ForecastError {
        ForecastError::ArtifactWrite {
            path: self.path.clone(),
            source,
        }
    }
}

/// Compute SHA256 checksum of data
/// Sibling of `path` with `.tmp` appended to the full file name
fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path.file_name().unwrap_or_default().to_os_string();
    name.push(".tmp");
    path.with_file_name(name)
}

fn compute_checksum(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    hex::encode(hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::RawObservation;
    use crate::predictor::estimator::{Algorithm, EstimatorConfig, EstimatorModel, GradientBoostingParams};
    use crate::predictor::pipeline::WeatherPipeline;
    use crate::predictor::test_support::hourly_examples;
    use tempfile::TempDir;

    fn fitted(algorithm: Algorithm) -> WeatherPipeline {
        let config = EstimatorConfig {
            algorithm,
            gradient_boosting: GradientBoostingParams {
                n_estimators: 40,
                learning_rate: 0.1,
                ..Default::default()
            },
            ..Default::default()
        };
        PredictionPipeline::new(config.build().unwrap())
            .fit(&hourly_examples(72))
            .unwrap()
    }

    fn sample() -> RawObservation {
        RawObservation {
            timestamp: Some("2025-07-03T00:00:00".to_string()),
            temperature: Some(28.0),
            humidity: Some(70.0),
            pressure: Some(1010.0),
            wind_speed: Some(12.0),
        }
    }

    fn rewrite_envelope(path: &Path, edit: impl FnOnce(&mut serde_json::Value)) {
        let mut value: serde_json::Value =
            serde_json::from_slice(&fs::read(path).unwrap()).unwrap();
        edit(&mut value);
        fs::write(path, serde_json::to_vec(&value).unwrap()).unwrap();
    }

    #[test]
    fn test_compute_checksum() {
        let checksum = compute_checksum(b"model");
        assert_eq!(checksum.len(), 64);
        assert_eq!(checksum, compute_checksum(b"model"));
        assert_ne!(checksum, compute_checksum(b"model2"));
    }

    #[test]
    fn test_round_trip_preserves_predictions() {
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path().join("model").join("weather_pipeline.json"));

        for algorithm in [Algorithm::GradientBoosting, Algorithm::Ridge] {
            let pipeline = fitted(algorithm);
            store.save(&pipeline).unwrap();
            let loaded: WeatherPipeline = store.load().unwrap();

            let expected = pipeline.predict(&sample()).unwrap();
            let actual = loaded.predict(&sample()).unwrap();
            assert!((expected - actual).abs() < 1e-9);
            assert_eq!(loaded.metadata(), pipeline.metadata());
        }
        assert!(!temp_dir
            .path()
            .join("model")
            .join("weather_pipeline.json.tmp")
            .exists());
    }

    #[test]
    fn test_missing_artifact_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path().join("absent.json"));
        let err = store.load::<EstimatorModel>().unwrap_err();
        assert!(matches!(err, ForecastError::ArtifactNotFound(_)));
        assert!(matches!(store.inspect(), Err(ForecastError::ArtifactNotFound(_))));
    }

    #[test]
    fn test_unfitted_pipeline_not_saved() {
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path().join("model.json"));
        let unfitted = WeatherPipeline::new(EstimatorModel::default());
        assert!(matches!(store.save(&unfitted), Err(ForecastError::NotFitted)));
        assert!(!store.path().exists());
    }

    #[test]
    fn test_garbage_file_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("model.json");
        fs::write(&path, b"\x00\x01 not json").unwrap();
        let err = ModelStore::new(&path).load::<EstimatorModel>().unwrap_err();
        assert!(matches!(err, ForecastError::ArtifactCorrupt { .. }));
    }

    #[test]
    fn test_tampered_payload_fails_checksum() {
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path().join("model.json"));
        store.save(&fitted(Algorithm::Ridge)).unwrap();

        rewrite_envelope(store.path(), |v| {
            let payload = format!("{} ", v["pipeline"].as_str().unwrap());
            v["pipeline"] = serde_json::Value::String(payload);
        });

        let err = store.load::<EstimatorModel>().unwrap_err();
        assert!(err.to_string().contains("checksum"), "{}", err);
    }

    #[test]
    fn test_schema_mismatch_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path().join("model.json"));
        store.save(&fitted(Algorithm::Ridge)).unwrap();

        rewrite_envelope(store.path(), |v| {
            v["feature_schema"] = serde_json::json!([
                "humidity", "temperature", "pressure", "wind_speed", "hour", "weekday", "month"
            ]);
        });

        let err = store.load::<EstimatorModel>().unwrap_err();
        match err {
            ForecastError::ArtifactCorrupt { reason, .. } => assert!(reason.contains("schema")),
            other => panic!("unexpected error {:?}", other),
        }
    }

    #[test]
    fn test_unknown_format_version_is_corrupt() {
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path().join("model.json"));
        store.save(&fitted(Algorithm::Ridge)).unwrap();
        rewrite_envelope(store.path(), |v| v["format_version"] = serde_json::json!(99));
        assert!(matches!(
            store.load::<EstimatorModel>(),
            Err(ForecastError::ArtifactCorrupt { .. })
        ));
    }

    #[test]
    fn test_inspect_reports_metadata() {
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path().join("model.json"));
        let saved = store.save(&fitted(Algorithm::GradientBoosting)).unwrap();
        let info = store.inspect().unwrap();
        assert_eq!(info.algorithm, "gradient_boosting");
        assert_eq!(info.checksum, saved.checksum);
        assert_eq!(info.feature_schema.len(), 7);
        assert_eq!(info.format_version, ARTIFACT_FORMAT_VERSION);
    }

    #[test]
    fn test_save_replaces_previous_artifact() {
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path().join("model.json"));
        store.save(&fitted(Algorithm::GradientBoosting)).unwrap();
        store.save(&fitted(Algorithm::Ridge)).unwrap();
        let loaded: WeatherPipeline = store.load().unwrap();
        assert_eq!(loaded.estimator().algorithm(), "ridge");
    }

    #[test]
    fn test_temp_file_never_collides_with_artifact() {
        assert_eq!(
            temp_path_for(Path::new("model/pipeline.json")),
            PathBuf::from("model/pipeline.json.tmp")
        );
        assert_ne!(
            temp_path_for(Path::new("model.json")),
            temp_path_for(Path::new("model.bin"))
        );

        // an artifact whose own extension is .tmp must still round trip
        let temp_dir = TempDir::new().unwrap();
        let store = ModelStore::new(temp_dir.path().join("staging.tmp"));
        store.save(&fitted(Algorithm::Ridge)).unwrap();
        let loaded: WeatherPipeline = store.load().unwrap();
        assert!(loaded.is_fitted());
        assert!(!temp_dir.path().join("staging.tmp.tmp").exists());
    }
}
