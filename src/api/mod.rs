pub mod handlers;
pub mod routes;

pub use routes::*;

use crate::ml::PredictionService;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub service: Arc<PredictionService>,
    /// Bundle location used by `/api/model/reload`
    pub model_path: PathBuf,
    pub metrics_enabled: bool,
    pub request_timeout: Duration,
}

impl AppState {
    pub fn new(service: Arc<PredictionService>, model_path: impl Into<PathBuf>) -> Self {
        Self {
            service,
            model_path: model_path.into(),
            metrics_enabled: true,
            request_timeout: Duration::from_secs(30),
        }
    }

    pub fn with_metrics(mut self, enabled: bool) -> Self {
        self.metrics_enabled = enabled;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}
