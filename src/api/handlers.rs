use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::ml::{HealthStatus, ModelInfo, Observation, PredictionResult};
use axum::{
    extract::State,
    http::header,
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::info;

/// Health check endpoint
pub async fn health_check(State(state): State<AppState>) -> Json<HealthStatus> {
    Json(state.service.health())
}

/// Predict maintenance needs for one vehicle
pub async fn predict_maintenance(
    State(state): State<AppState>,
    Json(body): Json<Value>,
) -> Result<Json<PredictionResult>> {
    if body.as_object().map_or(true, |map| map.is_empty()) {
        return Err(AppError::Validation("No data provided".to_string()));
    }

    let observation = Observation::from_json(&body)?;
    let result = state.service.predict(&observation)?;

    info!(
        vehicle_id = observation.vehicle_id().unwrap_or("unknown"),
        urgency = %result.urgency,
        "Prediction made for vehicle"
    );
    Ok(Json(result))
}

#[derive(Debug, Deserialize)]
pub struct BatchPredictionRequest {
    #[serde(default)]
    pub vehicles: Vec<Value>,
}

/// Batch item: `vehicle_id` is always present, `null` when the input had none
#[derive(Debug, Serialize, Deserialize)]
pub struct BatchPrediction {
    pub vehicle_id: Option<String>,
    #[serde(flatten)]
    pub result: PredictionResult,
}

impl From<PredictionResult> for BatchPrediction {
    fn from(mut result: PredictionResult) -> Self {
        Self {
            vehicle_id: result.vehicle_id.take(),
            result,
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct BatchPredictionResponse {
    pub predictions: Vec<BatchPrediction>,
}

/// Predict maintenance needs for several vehicles, preserving order
pub async fn predict_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchPredictionRequest>,
) -> Result<Json<BatchPredictionResponse>> {
    if request.vehicles.is_empty() {
        return Err(AppError::Validation("No vehicles data provided".to_string()));
    }

    let observations = request
        .vehicles
        .iter()
        .map(Observation::from_json)
        .collect::<Result<Vec<_>>>()?;
    let predictions = state
        .service
        .predict_batch(&observations)?
        .into_iter()
        .map(BatchPrediction::from)
        .collect();

    Ok(Json(BatchPredictionResponse { predictions }))
}

/// Feature schema and model descriptor
pub async fn model_info(State(state): State<AppState>) -> Json<ModelInfo> {
    Json(state.service.model_info())
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ReloadResponse {
    pub reloaded: bool,
    pub model_path: String,
    pub model: ModelInfo,
}

/// Reload the bundle from the configured path and swap it in
pub async fn reload_model(State(state): State<AppState>) -> Result<Json<ReloadResponse>> {
    let service = state.service.clone();
    let path = state.model_path.clone();

    tokio::task::spawn_blocking(move || service.load(path))
        .await
        .map_err(|e| AppError::Internal(format!("Model reload task failed: {}", e)))??;

    info!(path = %state.model_path.display(), "Model reloaded");
    Ok(Json(ReloadResponse {
        reloaded: true,
        model_path: state.model_path.display().to_string(),
        model: state.service.model_info(),
    }))
}

/// Prometheus text exposition
pub async fn metrics() -> impl IntoResponse {
    (
        [(header::CONTENT_TYPE, "text/plain; version=0.0.4")],
        crate::metrics::gather_metrics(),
    )
}
