//! Prometheus metrics for the prediction service.
//!
//! Metrics are observational only: nothing in the prediction path reads them.
//!
//! # Example
//! ```no_run
//! use fleet_maintenance_predictor::metrics::PREDICTIONS_TOTAL;
//!
//! PREDICTIONS_TOTAL.with_label_values(&["HIGH"]).inc();
//! ```

use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Gauge, Histogram, HistogramOpts, Opts, Registry,
};

const NAMESPACE: &str = "fleet_maintenance";

lazy_static! {
    /// Registry exported by `GET /metrics`
    pub static ref PROMETHEUS_REGISTRY: Registry = Registry::new();

    /// Successful predictions
    ///
    /// Labels: urgency
    pub static ref PREDICTIONS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("predictions_total", "Total number of maintenance predictions")
            .namespace(NAMESPACE),
        &["urgency"]
    ).expect("Failed to create PREDICTIONS_TOTAL metric");

    /// Failed predictions
    ///
    /// Labels: reason (error code)
    pub static ref PREDICTION_ERRORS_TOTAL: CounterVec = CounterVec::new(
        Opts::new("prediction_errors_total", "Total number of failed predictions")
            .namespace(NAMESPACE),
        &["reason"]
    ).expect("Failed to create PREDICTION_ERRORS_TOTAL metric");

    /// Time spent in a single or batch prediction call
    pub static ref PREDICTION_DURATION_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "prediction_duration_seconds",
            "Prediction call duration in seconds"
        )
        .namespace(NAMESPACE)
        .buckets(vec![0.0005, 0.001, 0.0025, 0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0]),
    ).expect("Failed to create PREDICTION_DURATION_SECONDS metric");

    /// Number of vehicles per batch request
    pub static ref BATCH_SIZE: Histogram = Histogram::with_opts(
        HistogramOpts::new("batch_size", "Vehicles per batch prediction request")
            .namespace(NAMESPACE)
            .buckets(vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0, 500.0, 1000.0]),
    ).expect("Failed to create BATCH_SIZE metric");

    /// 1 while a model bundle is active
    pub static ref MODEL_LOADED: Gauge = Gauge::with_opts(
        Opts::new("model_loaded", "Whether a model bundle is loaded")
            .namespace(NAMESPACE)
    ).expect("Failed to create MODEL_LOADED metric");

    /// Bundles published through load, reload or training
    pub static ref MODEL_RELOADS_TOTAL: Counter = Counter::with_opts(
        Opts::new("model_reloads_total", "Total number of model bundle swaps")
            .namespace(NAMESPACE)
    ).expect("Failed to create MODEL_RELOADS_TOTAL metric");
}

/// Register every metric with the global registry.
///
/// Call once per process; a second call returns `AlreadyReg`.
pub fn init_metrics() -> Result<(), prometheus::Error> {
    PROMETHEUS_REGISTRY.register(Box::new(PREDICTIONS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(PREDICTION_ERRORS_TOTAL.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(PREDICTION_DURATION_SECONDS.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(BATCH_SIZE.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(MODEL_LOADED.clone()))?;
    PROMETHEUS_REGISTRY.register(Box::new(MODEL_RELOADS_TOTAL.clone()))?;

    tracing::info!("Prometheus metrics initialized");
    Ok(())
}

/// Export the registry in Prometheus text format
pub fn gather_metrics() -> String {
    use prometheus::Encoder;
    let encoder = prometheus::TextEncoder::new();
    let metric_families = PROMETHEUS_REGISTRY.gather();
    let mut buffer = Vec::new();

    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        tracing::error!("Failed to encode metrics: {}", e);
        return String::from("# Error encoding metrics\n");
    }

    String::from_utf8(buffer).unwrap_or_else(|e| {
        tracing::error!("Failed to convert metrics to string: {}", e);
        String::from("# Error converting metrics\n")
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counters_increment() {
        let before = PREDICTIONS_TOTAL.with_label_values(&["LOW"]).get();
        PREDICTIONS_TOTAL.with_label_values(&["LOW"]).inc();
        assert!(PREDICTIONS_TOTAL.with_label_values(&["LOW"]).get() >= before + 1.0);
    }

    #[test]
    fn test_gather_after_init() {
        // other tests may have registered already
        let _ = init_metrics();
        MODEL_LOADED.set(1.0);
        let text = gather_metrics();
        assert!(text.contains("fleet_maintenance_model_loaded"));
    }
}
