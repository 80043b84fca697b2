use crate::error::{AppError, Result};
use crate::metrics::{
    BATCH_SIZE, MODEL_LOADED, MODEL_RELOADS_TOTAL, PREDICTIONS_TOTAL, PREDICTION_DURATION_SECONDS,
    PREDICTION_ERRORS_TOTAL,
};
use crate::ml::bundle::{BundleMetadata, ModelBundle, MODEL_FORMAT_VERSION, MODEL_TYPE, MODEL_VERSION};
use crate::ml::classifier::{accuracy, Classifier, ForestParams, RandomForestClassifier};
use crate::ml::dataset::{DatasetPreparer, TrainingDataset};
use crate::ml::decision::{DecisionEngine, PredictionResult};
use crate::ml::scaler::FeatureScaler;
use crate::ml::schema::{FeatureSchema, Observation};
use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info, warn};

/// Number of importances written to the training log
const LOGGED_IMPORTANCES: usize = 5;

/// Outcome of one training run, for observability only
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingReport {
    pub train_accuracy: f64,
    pub test_accuracy: f64,
    /// (feature, importance), most important first
    pub feature_importance: Vec<(String, f64)>,
    pub n_train: usize,
    pub n_test: usize,
    pub positive_rate: f64,
    pub mean_urgency_score: f64,
}

/// Static descriptor plus provenance of the active bundle
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelInfo {
    pub feature_names: Vec<String>,
    pub model_type: String,
    pub version: String,
    pub format_version: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub trained_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub train_accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub test_accuracy: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub n_training_samples: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthStatus {
    pub status: String,
    pub model_loaded: bool,
    pub version: String,
}

/// Holds the active model bundle and runs the train/predict lifecycle.
///
/// The bundle is an immutable snapshot behind an `Arc`. Loading or training
/// publishes a new snapshot by swapping the pointer, so a prediction in
/// flight keeps using whichever bundle it started with.
pub struct PredictionService {
    active: RwLock<Option<Arc<ModelBundle>>>,
    engine: DecisionEngine,
    preparer: DatasetPreparer,
    forest_params: ForestParams,
}

impl Default for PredictionService {
    fn default() -> Self {
        Self::new()
    }
}

impl PredictionService {
    /// Service with no model loaded and default training policy
    pub fn new() -> Self {
        Self {
            active: RwLock::new(None),
            engine: DecisionEngine::default(),
            preparer: DatasetPreparer::default(),
            forest_params: ForestParams::default(),
        }
    }

    pub fn with_preparer(mut self, preparer: DatasetPreparer) -> Self {
        self.preparer = preparer;
        self
    }

    pub fn with_forest_params(mut self, params: ForestParams) -> Self {
        self.forest_params = params;
        self
    }

    pub fn engine(&self) -> &DecisionEngine {
        &self.engine
    }

    pub fn is_loaded(&self) -> bool {
        self.active.read().is_some()
    }

    /// Snapshot of the active bundle
    pub fn current(&self) -> Result<Arc<ModelBundle>> {
        self.active.read().clone().ok_or(AppError::ModelNotLoaded)
    }

    /// Replace the active bundle wholesale and return the previous one
    pub fn publish(&self, bundle: ModelBundle) -> Option<Arc<ModelBundle>> {
        let previous = self.active.write().replace(Arc::new(bundle));
        MODEL_LOADED.set(1.0);
        MODEL_RELOADS_TOTAL.inc();
        previous
    }

    /// Ordered feature names every bundle must be built against
    pub fn feature_names(&self) -> &'static [String] {
        FeatureSchema::canonical().names()
    }

    /// Fit a new bundle without touching the active one
    pub fn fit_bundle(&self, dataset: &TrainingDataset) -> Result<(ModelBundle, TrainingReport)> {
        info!(records = dataset.len(), "Preparing training data");
        let split = self.preparer.prepare(dataset)?;

        let (scaler, x_train) = FeatureScaler::fit_transform(&split.x_train)?;
        let x_test = scaler.transform(&split.x_test)?;

        let mut forest = RandomForestClassifier::new(self.forest_params);
        forest.fit(&x_train, &split.y_train)?;

        let train_accuracy = accuracy(&forest, &x_train, &split.y_train)?;
        let test_accuracy = accuracy(&forest, &x_test, &split.y_test)?;
        let feature_importance = forest.ranked_importance(self.feature_names());

        let report = TrainingReport {
            train_accuracy,
            test_accuracy,
            feature_importance,
            n_train: split.summary.n_train,
            n_test: split.summary.n_test,
            positive_rate: split.summary.positive_rate,
            mean_urgency_score: split.summary.mean_urgency_score,
        };

        info!(
            n_train = report.n_train,
            n_test = report.n_test,
            positive_rate = report.positive_rate,
            mean_urgency_score = report.mean_urgency_score,
            train_accuracy = report.train_accuracy,
            test_accuracy = report.test_accuracy,
            "Model training completed"
        );
        for (name, importance) in report.feature_importance.iter().take(LOGGED_IMPORTANCES) {
            info!(feature = %name, importance = importance, "Feature importance");
        }

        let bundle = ModelBundle::new(
            forest,
            scaler,
            BundleMetadata {
                trained_at: Utc::now(),
                n_training_samples: report.n_train,
                train_accuracy,
                test_accuracy,
            },
        )?;
        Ok((bundle, report))
    }

    /// Train and publish a new bundle
    pub fn train_with_report(&self, dataset: &TrainingDataset) -> Result<TrainingReport> {
        let (bundle, report) = self.fit_bundle(dataset)?;
        self.publish(bundle);
        Ok(report)
    }

    /// Train and publish a new bundle, returning test accuracy
    pub fn train(&self, dataset: &TrainingDataset) -> Result<f64> {
        Ok(self.train_with_report(dataset)?.test_accuracy)
    }

    /// Persist the active bundle
    pub fn save(&self, path: impl AsRef<Path>) -> Result<()> {
        self.current()?.save(path)
    }

    /// Load a bundle from disk and publish it.
    ///
    /// On failure the previously active bundle stays in place.
    pub fn load(&self, path: impl AsRef<Path>) -> Result<()> {
        let bundle = ModelBundle::load(path)?;
        if self.publish(bundle).is_some() {
            info!("Replaced previously active model");
        }
        Ok(())
    }

    /// Predict for one observation
    pub fn predict(&self, observation: &Observation) -> Result<PredictionResult> {
        let timer = PREDICTION_DURATION_SECONDS.start_timer();
        let outcome = self
            .current()
            .and_then(|bundle| self.predict_with(&bundle, observation));
        timer.observe_duration();

        if let Err(e) = &outcome {
            PREDICTION_ERRORS_TOTAL
                .with_label_values(&[e.error_code()])
                .inc();
        }
        outcome
    }

    /// Predict for every observation against one bundle snapshot.
    ///
    /// Results keep input order. Any single failure fails the whole batch.
    pub fn predict_batch(&self, observations: &[Observation]) -> Result<Vec<PredictionResult>> {
        if observations.is_empty() {
            return Err(AppError::Validation("No vehicles data provided".to_string()));
        }

        let timer = PREDICTION_DURATION_SECONDS.start_timer();
        BATCH_SIZE.observe(observations.len() as f64);

        let outcome = self.current().and_then(|bundle| {
            observations
                .iter()
                .map(|observation| self.predict_with(&bundle, observation))
                .collect::<Result<Vec<_>>>()
        });
        timer.observe_duration();

        match &outcome {
            Ok(results) => info!(vehicles = results.len(), "Batch prediction completed"),
            Err(e) => {
                warn!(vehicles = observations.len(), error = %e, "Batch prediction failed");
                PREDICTION_ERRORS_TOTAL
                    .with_label_values(&[e.error_code()])
                    .inc();
            }
        }
        outcome
    }

    fn predict_with(
        &self,
        bundle: &ModelBundle,
        observation: &Observation,
    ) -> Result<PredictionResult> {
        let result = bundle.predict(observation, &self.engine)?;
        PREDICTIONS_TOTAL
            .with_label_values(&[result.urgency.as_str()])
            .inc();
        debug!(
            vehicle_id = observation.vehicle_id().unwrap_or("unknown"),
            probability = result.probability,
            urgency = %result.urgency,
            "Prediction made"
        );
        Ok(result)
    }

    /// Model introspection: schema, static descriptor, active bundle provenance
    pub fn model_info(&self) -> ModelInfo {
        let active = self.active.read().clone();
        let metadata = active.as_ref().map(|bundle| bundle.metadata().clone());

        ModelInfo {
            feature_names: self.feature_names().to_vec(),
            model_type: MODEL_TYPE.to_string(),
            version: MODEL_VERSION.to_string(),
            format_version: active
                .as_ref()
                .map(|bundle| bundle.format_version())
                .unwrap_or(MODEL_FORMAT_VERSION),
            trained_at: metadata.as_ref().map(|m| m.trained_at),
            train_accuracy: metadata.as_ref().map(|m| m.train_accuracy),
            test_accuracy: metadata.as_ref().map(|m| m.test_accuracy),
            n_training_samples: metadata.as_ref().map(|m| m.n_training_samples),
        }
    }

    pub fn health(&self) -> HealthStatus {
        HealthStatus {
            status: "healthy".to_string(),
            model_loaded: self.is_loaded(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ml::dataset::TrainingRecord;
    use crate::ml::schema::Feature;

    fn small_service() -> PredictionService {
        PredictionService::new().with_forest_params(ForestParams {
            n_trees: 10,
            ..ForestParams::default()
        })
    }

    /// Low oil pressure means imminent failure
    fn oil_dataset(n: usize) -> TrainingDataset {
        let records = (0..n)
            .map(|i| {
                let oil = 15.0 + (i % 50) as f64;
                let days = if oil < 30.0 { 5.0 } else { 60.0 };
                TrainingRecord::new(Observation::new().with(Feature::OilPressure, oil), days)
            })
            .collect();
        TrainingDataset::new(records)
    }

    #[test]
    fn test_predict_without_model() {
        let service = PredictionService::new();
        assert!(!service.is_loaded());
        assert!(matches!(
            service.predict(&Observation::new()),
            Err(AppError::ModelNotLoaded)
        ));
        assert!(matches!(
            service.save("unused.bin"),
            Err(AppError::ModelNotLoaded)
        ));
    }

    #[test]
    fn test_empty_batch_rejected() {
        let service = PredictionService::new();
        assert!(matches!(
            service.predict_batch(&[]),
            Err(AppError::Validation(_))
        ));
    }

    #[test]
    fn test_train_publishes_bundle() {
        let service = small_service();
        let report = service.train_with_report(&oil_dataset(200)).unwrap();

        assert!(service.is_loaded());
        assert_eq!(report.n_train + report.n_test, 200);
        assert_eq!(report.n_test, 40);
        assert!(report.test_accuracy > 0.9);
        assert_eq!(report.feature_importance[0].0, "oil_pressure");

        let low = service
            .predict(&Observation::new().with(Feature::OilPressure, 18.0))
            .unwrap();
        let high = service
            .predict(&Observation::new().with(Feature::OilPressure, 60.0))
            .unwrap();
        assert!(low.probability > high.probability);
    }

    #[test]
    fn test_publish_swaps_whole_bundle() {
        let service = small_service();
        service.train(&oil_dataset(100)).unwrap();
        let snapshot = service.current().unwrap();

        service.train(&oil_dataset(120)).unwrap();
        let fresh = service.current().unwrap();

        assert!(!Arc::ptr_eq(&snapshot, &fresh));
        // old snapshot stays usable for in-flight work
        assert!(snapshot
            .predict_proba(&Observation::new().with(Feature::OilPressure, 20.0))
            .is_ok());
    }

    #[test]
    fn test_failed_load_keeps_previous_bundle() {
        let service = small_service();
        service.train(&oil_dataset(100)).unwrap();
        let before = service.current().unwrap();

        let dir = tempfile::tempdir().unwrap();
        assert!(service.load(dir.path().join("missing.bin")).is_err());
        assert!(Arc::ptr_eq(&before, &service.current().unwrap()));
    }

    #[test]
    fn test_model_info_without_model() {
        let info = PredictionService::new().model_info();
        assert_eq!(info.feature_names.len(), 15);
        assert_eq!(info.model_type, "Random Forest Classifier");
        assert_eq!(info.version, "1.0");
        assert!(info.trained_at.is_none());
    }

    #[test]
    fn test_health_reports_model_state() {
        let service = small_service();
        assert!(!service.health().model_loaded);
        service.train(&oil_dataset(60)).unwrap();
        let health = service.health();
        assert!(health.model_loaded);
        assert_eq!(health.status, "healthy");
    }
}
