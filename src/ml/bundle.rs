use crate::error::{AppError, Result};
use crate::ml::classifier::{Classifier, RandomForestClassifier};
use crate::ml::decision::{DecisionEngine, PredictionResult};
use crate::ml::scaler::FeatureScaler;
use crate::ml::schema::{FeatureSchema, FeatureVectorBuilder, Observation};
use chrono::{DateTime, Utc};
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::io::Write;
use std::path::{Path, PathBuf};

/// On-disk layout version. Bump when the serialized structure changes.
pub const MODEL_FORMAT_VERSION: u32 = 1;

/// Static descriptor reported by model introspection
pub const MODEL_TYPE: &str = "Random Forest Classifier";
pub const MODEL_VERSION: &str = "1.0";

/// Training provenance stored alongside the model
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BundleMetadata {
    pub trained_at: DateTime<Utc>,
    pub n_training_samples: usize,
    pub train_accuracy: f64,
    pub test_accuracy: f64,
}

/// Classifier, scaler and feature list, persisted and restored as one unit.
///
/// `format_version` must stay the first field: [`ModelBundle::from_bytes`]
/// reads it before decoding the rest.
#[derive(Debug, Serialize, Deserialize)]
pub struct ModelBundle {
    format_version: u32,
    classifier: RandomForestClassifier,
    scaler: FeatureScaler,
    feature_names: Vec<String>,
    metadata: BundleMetadata,
}

impl ModelBundle {
    /// Bundle a freshly trained classifier and scaler under the compiled schema
    pub fn new(
        classifier: RandomForestClassifier,
        scaler: FeatureScaler,
        metadata: BundleMetadata,
    ) -> Result<Self> {
        let bundle = Self {
            format_version: MODEL_FORMAT_VERSION,
            classifier,
            scaler,
            feature_names: FeatureSchema::canonical().names().to_vec(),
            metadata,
        };
        bundle.check_consistency()?;
        Ok(bundle)
    }

    pub fn format_version(&self) -> u32 {
        self.format_version
    }

    pub fn classifier(&self) -> &RandomForestClassifier {
        &self.classifier
    }

    pub fn scaler(&self) -> &FeatureScaler {
        &self.scaler
    }

    pub fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    pub fn metadata(&self) -> &BundleMetadata {
        &self.metadata
    }

    fn check_consistency(&self) -> Result<()> {
        if !self.classifier.is_trained() {
            return Err(AppError::ModelNotLoaded);
        }
        let width = self.feature_names.len();
        if self.scaler.n_features() != width || self.classifier.n_features() != width {
            return Err(AppError::Serialization(format!(
                "Bundle components disagree on width: schema {}, scaler {}, classifier {}",
                width,
                self.scaler.n_features(),
                self.classifier.n_features()
            )));
        }
        Ok(())
    }

    /// Scale a raw feature matrix and return class-1 probabilities
    pub fn predict_proba_matrix(&self, x: &Array2<f64>) -> Result<ndarray::Array1<f64>> {
        let scaled = self.scaler.transform(x)?;
        self.classifier.predict_proba(&scaled)
    }

    /// Probability that the vehicle needs maintenance within the horizon
    pub fn predict_proba(&self, observation: &Observation) -> Result<f64> {
        let row = FeatureVectorBuilder::canonical().build(observation).to_row();
        let proba = self.predict_proba_matrix(&row)?;
        proba
            .first()
            .copied()
            .ok_or_else(|| AppError::Internal("Classifier returned no probability".to_string()))
    }

    /// Full inference path for one observation
    pub fn predict(
        &self,
        observation: &Observation,
        engine: &DecisionEngine,
    ) -> Result<PredictionResult> {
        let probability = self.predict_proba(observation)?;
        let decision = engine.decide(probability, observation);
        Ok(
            PredictionResult::from_decision(probability > 0.5, probability, decision)
                .with_vehicle_id(observation.vehicle_id().map(str::to_string)),
        )
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        Ok(bincode::serialize(self)?)
    }

    /// Decode an artifact, checking format version and schema
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        let found: u32 = bincode::deserialize(bytes)?;
        if found != MODEL_FORMAT_VERSION {
            return Err(AppError::UnsupportedModelVersion {
                found,
                supported: MODEL_FORMAT_VERSION,
            });
        }

        let bundle: ModelBundle = bincode::deserialize(bytes)?;
        FeatureSchema::canonical().validate(&bundle.feature_names)?;
        bundle.check_consistency()?;
        Ok(bundle)
    }

    /// Write the artifact atomically: temp file in the same directory, then rename
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }

        let bytes = self.to_bytes()?;
        let tmp_path = temp_path_for(path);
        {
            let mut file = std::fs::File::create(&tmp_path)?;
            file.write_all(&bytes)?;
            file.sync_all()?;
        }
        if let Err(e) = std::fs::rename(&tmp_path, path) {
            let _ = std::fs::remove_file(&tmp_path);
            return Err(e.into());
        }

        tracing::info!(
            path = %path.display(),
            format_version = self.format_version,
            bytes = bytes.len(),
            "Model saved"
        );
        Ok(())
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let bytes = std::fs::read(path)?;
        let bundle = Self::from_bytes(&bytes).map_err(|e| {
            if let AppError::SchemaMismatch { .. } = e {
                tracing::error!(path = %path.display(), "Model feature schema does not match this build");
            }
            e
        })?;

        tracing::info!(
            path = %path.display(),
            format_version = bundle.format_version,
            trained_at = %bundle.metadata.trained_at,
            "Model loaded"
        );
        Ok(bundle)
    }
}

fn temp_path_for(path: &Path) -> PathBuf {
    let mut name = path
        .file_name()
        .map(|n| n.to_os_string())
        .unwrap_or_default();
    name.push(".tmp");
    path.with_file_name(name)
}
