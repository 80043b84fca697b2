use crate::api::{handlers, AppState};
use axum::{
    routing::{get, post},
    Router,
};
use tower_http::{
    cors::CorsLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer},
};

/// Build the main API router
pub fn build_router(state: AppState) -> Router {
    let timeout = state.request_timeout;
    let metrics_enabled = state.metrics_enabled;

    let mut router = Router::new()
        // Health
        .route("/health", get(handlers::health_check))
        // Prediction
        .route("/api/predict/maintenance", post(handlers::predict_maintenance))
        .route("/api/predict/batch", post(handlers::predict_batch))
        // Model lifecycle
        .route("/api/model/info", get(handlers::model_info))
        .route("/api/model/reload", post(handlers::reload_model));

    if metrics_enabled {
        router = router.route("/metrics", get(handlers::metrics));
    }

    router
        .with_state(state)
        .layer(TimeoutLayer::new(timeout))
        .layer(
            TraceLayer::new_for_http()
                .make_span_with(DefaultMakeSpan::new().include_headers(true))
                .on_response(DefaultOnResponse::new().include_headers(true)),
        )
        .layer(CorsLayer::permissive())
}
