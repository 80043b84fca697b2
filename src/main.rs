use fleet_maintenance_predictor::{
    api::{build_router, AppState},
    config::Config,
    metrics::MODEL_LOADED,
    ml::PredictionService,
};
use std::sync::Arc;
use std::time::Duration;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Load configuration
    let config = Config::load().unwrap_or_else(|e| {
        eprintln!("Failed to load configuration: {}", e);
        eprintln!("Using default configuration");
        Config::default()
    });

    // Initialize tracing
    let json_logs = config.observability.json_logs;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
                format!(
                    "fleet_maintenance_predictor={},tower_http=info",
                    config.observability.log_level
                )
                .into()
            }),
        )
        .with(json_logs.then(|| tracing_subscriber::fmt::layer().json()))
        .with((!json_logs).then(tracing_subscriber::fmt::layer))
        .init();

    tracing::info!(
        service = %config.observability.service_name,
        "Starting fleet maintenance predictor v{}",
        env!("CARGO_PKG_VERSION")
    );

    // Initialize Prometheus metrics
    if config.observability.prometheus_enabled {
        if let Err(e) = fleet_maintenance_predictor::metrics::init_metrics() {
            tracing::warn!("Failed to initialize metrics: {}", e);
            tracing::warn!("Continuing without metrics");
        }
    } else {
        tracing::info!("Prometheus metrics disabled in configuration");
    }

    // Load the model bundle
    let service = Arc::new(PredictionService::new());
    let model_path = config.model.path.clone();
    let loader = service.clone();
    let load_path = model_path.clone();
    let loaded = tokio::task::spawn_blocking(move || loader.load(load_path)).await?;

    match loaded {
        Ok(()) => tracing::info!(path = %model_path.display(), "Model loaded successfully"),
        Err(e) if config.model.require_on_startup => {
            tracing::error!(path = %model_path.display(), "Error loading model: {}", e);
            return Err(e.into());
        }
        Err(e) => {
            MODEL_LOADED.set(0.0);
            tracing::error!(path = %model_path.display(), "Error loading model: {}", e);
            tracing::warn!("Serving without a model; predictions return 503 until reload");
        }
    }

    let state = AppState::new(service, model_path)
        .with_metrics(config.observability.prometheus_enabled)
        .with_request_timeout(Duration::from_secs(config.server.request_timeout_secs));
    let app = build_router(state);

    let http_addr = config.server.bind_address();
    let listener = tokio::net::TcpListener::bind(&http_addr).await?;

    tracing::info!("HTTP API server listening on http://{}", http_addr);
    tracing::info!("   Health check: http://{}/health", http_addr);
    tracing::info!("   Prediction: http://{}/api/predict/maintenance", http_addr);
    tracing::info!("Press Ctrl+C to shutdown");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Shutting down gracefully...");
    Ok(())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::error!("Failed to listen for shutdown signal: {}", e);
        std::future::pending::<()>().await;
    }
    tracing::info!("Shutdown signal received");
}
