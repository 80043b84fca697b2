use crate::error::Result;
use crate::ml::dataset::{DatasetPreparer, DEFAULT_SPLIT_SEED, DEFAULT_TEST_SIZE};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

const DEFAULT_CONFIG: &str = include_str!("../config/default.toml");

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Server configuration
    #[serde(default)]
    pub server: ServerConfig,

    /// Model artifact configuration
    #[serde(default)]
    pub model: ModelConfig,

    /// Offline training configuration
    #[serde(default)]
    pub training: TrainingConfig,

    /// Observability configuration
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

impl Config {
    /// Load configuration from file and environment
    pub fn load() -> std::result::Result<Self, config::ConfigError> {
        let config_path =
            std::env::var("CONFIG_PATH").unwrap_or_else(|_| "config/default.toml".to_string());

        config::Config::builder()
            // Start with default values
            .add_source(config::File::from_str(
                DEFAULT_CONFIG,
                config::FileFormat::Toml,
            ))
            // Override with config file if it exists
            .add_source(config::File::with_name(&config_path).required(false))
            // Override with environment variables (prefix: FMP_)
            .add_source(
                config::Environment::with_prefix("FMP")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?
            .try_deserialize()
    }

    /// Parse a TOML document layered over the embedded defaults
    pub fn from_toml_str(toml: &str) -> std::result::Result<Self, config::ConfigError> {
        config::Config::builder()
            .add_source(config::File::from_str(
                DEFAULT_CONFIG,
                config::FileFormat::Toml,
            ))
            .add_source(config::File::from_str(toml, config::FileFormat::Toml))
            .build()?
            .try_deserialize()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    /// HTTP server host
    #[serde(default = "default_host")]
    pub host: String,

    /// HTTP server port
    #[serde(default = "default_http_port")]
    pub http_port: u16,

    /// Request timeout (seconds)
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            http_port: default_http_port(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

impl ServerConfig {
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.http_port)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Location of the persisted model bundle
    #[serde(default = "default_model_path")]
    pub path: PathBuf,

    /// Refuse to start when the bundle cannot be loaded
    #[serde(default)]
    pub require_on_startup: bool,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            path: default_model_path(),
            require_on_startup: false,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrainingConfig {
    /// Historical maintenance records (CSV or JSON)
    #[serde(default = "default_data_path")]
    pub data_path: PathBuf,

    /// Held-out fraction, in (0, 1)
    #[serde(default = "default_test_size")]
    pub test_size: f64,

    /// Split seed
    #[serde(default = "default_seed")]
    pub seed: u64,
}

impl Default for TrainingConfig {
    fn default() -> Self {
        Self {
            data_path: default_data_path(),
            test_size: default_test_size(),
            seed: default_seed(),
        }
    }
}

impl TrainingConfig {
    pub fn preparer(&self) -> Result<DatasetPreparer> {
        DatasetPreparer::new(self.test_size, self.seed)
    }

    /// Replace configured values with any command-line flags that were given
    pub fn with_overrides(
        mut self,
        data_path: Option<PathBuf>,
        test_size: Option<f64>,
        seed: Option<u64>,
    ) -> Self {
        if let Some(path) = data_path {
            self.data_path = path;
        }
        if let Some(test_size) = test_size {
            self.test_size = test_size;
        }
        if let Some(seed) = seed {
            self.seed = seed;
        }
        self
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    /// Log level
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Enable JSON logging
    #[serde(default)]
    pub json_logs: bool,

    /// Service name
    #[serde(default = "default_service_name")]
    pub service_name: String,

    /// Expose `/metrics`
    #[serde(default = "default_true")]
    pub prometheus_enabled: bool,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
            json_logs: false,
            service_name: default_service_name(),
            prometheus_enabled: true,
        }
    }
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_http_port() -> u16 {
    5000
}

fn default_request_timeout() -> u64 {
    30
}

fn default_model_path() -> PathBuf {
    PathBuf::from("models/predictive_maintenance_model.bin")
}

fn default_data_path() -> PathBuf {
    PathBuf::from("training_data/vehicle_maintenance_history.csv")
}

fn default_test_size() -> f64 {
    DEFAULT_TEST_SIZE
}

fn default_seed() -> u64 {
    DEFAULT_SPLIT_SEED
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_service_name() -> String {
    "fleet-maintenance-predictor".to_string()
}

fn default_true() -> bool {
    true
}
