/// Vehicle maintenance prediction pipeline
///
/// Training path: dataset preparation, feature vectors, scaling, forest fit.
/// Inference path: feature vector, scaling, class probability, decision rules.
/// The scaler, forest and feature list travel together as one [`ModelBundle`].

pub mod bundle;
pub mod classifier;
pub mod dataset;
pub mod decision;
pub mod scaler;
pub mod schema;
pub mod service;

pub use bundle::{BundleMetadata, ModelBundle, MODEL_FORMAT_VERSION, MODEL_TYPE, MODEL_VERSION};
pub use classifier::{Classifier, ForestParams, RandomForestClassifier};
pub use dataset::{
    maintenance_urgency_score, DatasetPreparer, DatasetSummary, PreparedSplit, TrainingDataset,
    TrainingRecord,
};
pub use decision::{DecisionEngine, PredictionResult, Urgency};
pub use scaler::FeatureScaler;
pub use schema::{
    Feature, FeatureSchema, FeatureVector, FeatureVectorBuilder, Observation, FEATURE_COUNT,
    FEATURE_NAMES,
};
pub use service::{HealthStatus, ModelInfo, PredictionService, TrainingReport};
