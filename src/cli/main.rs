use anyhow::Context;
use clap::{Parser, Subcommand};
use fleet_maintenance_predictor::config::Config;
use fleet_maintenance_predictor::ml::{
    Feature, ModelBundle, Observation, PredictionService, TrainingDataset,
};
use reqwest::Client;
use serde_json::Value;
use std::path::PathBuf;
use std::sync::Arc;

#[derive(Parser)]
#[command(name = "fmp-cli")]
#[command(about = "Fleet maintenance predictor CLI", long_about = None, version)]
struct Cli {
    /// Server endpoint for remote commands
    #[arg(short, long, default_value = "http://localhost:5000", env = "FMP_ENDPOINT")]
    endpoint: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Train a model from historical records and save it
    Train {
        /// Historical records (.csv or .json) [default: training.data_path]
        #[arg(short, long)]
        data: Option<PathBuf>,

        /// Where to write the model bundle [default: model.path]
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Held-out fraction [default: training.test_size]
        #[arg(long)]
        test_size: Option<f64>,

        /// Split seed [default: training.seed]
        #[arg(long)]
        seed: Option<u64>,
    },

    /// Predict with a saved model
    Predict {
        /// Model bundle [default: model.path]
        #[arg(short, long)]
        model: Option<PathBuf>,

        /// JSON file holding one vehicle object or an array of them.
        /// Defaults to a built-in example vehicle.
        #[arg(short, long)]
        input: Option<PathBuf>,
    },

    /// Show the feature schema and descriptor of a saved model
    Info {
        /// Model bundle [default: model.path]
        #[arg(short, long)]
        model: Option<PathBuf>,
    },

    /// Check server health
    Health,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "fleet_maintenance_predictor=info".into()),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();

    // Same layering as the server: defaults, $CONFIG_PATH, then FMP__* env
    let config = Config::load().unwrap_or_else(|e| {
        tracing::warn!("Failed to load configuration, using defaults: {}", e);
        Config::default()
    });

    match cli.command {
        Commands::Train {
            data,
            output,
            test_size,
            seed,
        } => {
            let training = config.training.with_overrides(data, test_size, seed);
            let preparer = training.preparer()?;
            let data = training.data_path;
            let output = output.unwrap_or(config.model.path);
            let report = tokio::task::spawn_blocking(move || {
                let dataset = TrainingDataset::load(&data)
                    .with_context(|| format!("Failed to load training data from {}", data.display()))?;
                let service = PredictionService::new().with_preparer(preparer);
                let report = service.train_with_report(&dataset)?;
                service
                    .save(&output)
                    .with_context(|| format!("Failed to save model to {}", output.display()))?;
                println!("Model saved to {}", output.display());
                anyhow::Ok(report)
            })
            .await??;

            println!("Training accuracy: {:.3}", report.train_accuracy);
            println!("Test accuracy: {:.3}", report.test_accuracy);
            println!("\nTop 5 most important features:");
            for (name, importance) in report.feature_importance.iter().take(5) {
                println!("  {:<28} {:.4}", name, importance);
            }
        }

        Commands::Predict { model, input } => {
            let model = model.unwrap_or(config.model.path);
            let service = Arc::new(PredictionService::new());
            service
                .load(&model)
                .with_context(|| format!("Failed to load model from {}", model.display()))?;

            let output = match input {
                Some(path) => {
                    let text = std::fs::read_to_string(&path)
                        .with_context(|| format!("Failed to read {}", path.display()))?;
                    let value: Value = serde_json::from_str(&text)?;
                    match value {
                        Value::Array(items) => {
                            let observations = items
                                .iter()
                                .map(Observation::from_json)
                                .collect::<Result<Vec<_>, _>>()?;
                            serde_json::to_value(service.predict_batch(&observations)?)?
                        }
                        other => {
                            serde_json::to_value(service.predict(&Observation::from_json(&other)?)?)?
                        }
                    }
                }
                None => serde_json::to_value(service.predict(&example_vehicle())?)?,
            };

            println!("Prediction Result:");
            println!("{}", serde_json::to_string_pretty(&output)?);
        }

        Commands::Info { model } => {
            let model = model.unwrap_or(config.model.path);
            let bundle = ModelBundle::load(&model)
                .with_context(|| format!("Failed to load model from {}", model.display()))?;
            let service = PredictionService::new();
            service.publish(bundle);
            println!("{}", serde_json::to_string_pretty(&service.model_info())?);
        }

        Commands::Health => {
            let client = Client::new();
            let response = client
                .get(format!("{}/health", cli.endpoint))
                .send()
                .await?;

            let body: Value = response.json().await?;
            println!("{}", serde_json::to_string_pretty(&body)?);
        }
    }

    Ok(())
}

/// Mid-life delivery van with elevated vibration
fn example_vehicle() -> Observation {
    Observation::new()
        .with(Feature::EngineTemperature, 92.0)
        .with(Feature::VibrationLevel, 7.5)
        .with(Feature::OilPressure, 45.0)
        .with(Feature::Mileage, 85_000.0)
        .with(Feature::EngineRpm, 2_800.0)
        .with(Feature::FuelConsumption, 8.5)
        .with(Feature::BrakeWear, 65.0)
        .with(Feature::TirePressure, 32.0)
        .with(Feature::BatteryVoltage, 12.6)
        .with(Feature::CoolantLevel, 85.0)
        .with(Feature::DaysSinceLastMaintenance, 120.0)
        .with(Feature::HarshBrakingCount, 15.0)
        .with(Feature::HarshAccelerationCount, 10.0)
        .with(Feature::AverageSpeed, 65.0)
        .with(Feature::IdleTimePercentage, 15.0)
}
