//! Shared fixtures for the integration tests.
//!
//! Histories are synthetic but deterministic: a vehicle fails within two weeks
//! whenever any of the classic warning signs is present.
#![allow(dead_code)]

use fleet_maintenance_predictor::ml::{
    Feature, ForestParams, Observation, PredictionService, TrainingDataset, FEATURE_NAMES,
};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Fewer trees than production to keep the suite quick
pub fn quick_forest() -> ForestParams {
    ForestParams {
        n_trees: 40,
        ..ForestParams::default()
    }
}

pub fn quick_service() -> PredictionService {
    PredictionService::new().with_forest_params(quick_forest())
}

fn synthetic_row(rng: &mut StdRng) -> ([f64; 15], f64) {
    let mut values = [0.0; 15];
    values[Feature::EngineTemperature.index()] = rng.gen_range(70.0..115.0);
    values[Feature::VibrationLevel.index()] = rng.gen_range(2.0..10.0);
    values[Feature::OilPressure.index()] = rng.gen_range(20.0..70.0);
    values[Feature::Mileage.index()] = rng.gen_range(5_000.0..250_000.0);
    values[Feature::EngineRpm.index()] = rng.gen_range(800.0..4_500.0);
    values[Feature::FuelConsumption.index()] = rng.gen_range(5.0..15.0);
    values[Feature::BrakeWear.index()] = rng.gen_range(0.0..100.0);
    values[Feature::TirePressure.index()] = rng.gen_range(28.0..36.0);
    values[Feature::BatteryVoltage.index()] = rng.gen_range(11.8..14.4);
    values[Feature::CoolantLevel.index()] = rng.gen_range(40.0..100.0);
    values[Feature::DaysSinceLastMaintenance.index()] = rng.gen_range(0.0..240.0);
    values[Feature::HarshBrakingCount.index()] = rng.gen_range(0.0..40.0_f64).floor();
    values[Feature::HarshAccelerationCount.index()] = rng.gen_range(0.0..40.0_f64).floor();
    values[Feature::AverageSpeed.index()] = rng.gen_range(20.0..110.0);
    values[Feature::IdleTimePercentage.index()] = rng.gen_range(0.0..50.0);

    let at_risk = values[Feature::EngineTemperature.index()] > 100.0
        || values[Feature::VibrationLevel.index()] > 8.0
        || values[Feature::OilPressure.index()] < 30.0
        || values[Feature::DaysSinceLastMaintenance.index()] > 180.0;

    let days_until_failure = if at_risk {
        rng.gen_range(1.0..14.0_f64).floor()
    } else {
        rng.gen_range(20.0..120.0_f64).floor()
    };
    (values, days_until_failure)
}

/// CSV history with a header row and a leading `vehicle_id` column
pub fn fleet_history_csv(n: usize, seed: u64) -> String {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut csv = format!("vehicle_id,{},days_until_failure\n", FEATURE_NAMES.join(","));

    for i in 0..n {
        let (values, days) = synthetic_row(&mut rng);
        let cells: Vec<String> = values.iter().map(|v| format!("{:.3}", v)).collect();
        csv.push_str(&format!("VH-{:04},{},{}\n", i, cells.join(","), days));
    }
    csv
}

pub fn fleet_history(n: usize, seed: u64) -> TrainingDataset {
    TrainingDataset::from_csv_str(&fleet_history_csv(n, seed))
        .expect("synthetic history should parse")
}

/// Observation with the four warning-sign readings set and everything else nominal
pub fn vehicle(id: &str, temperature: f64, vibration: f64, oil: f64, days: f64) -> Observation {
    Observation::new()
        .with(Feature::EngineTemperature, temperature)
        .with(Feature::VibrationLevel, vibration)
        .with(Feature::OilPressure, oil)
        .with(Feature::Mileage, 90_000.0)
        .with(Feature::EngineRpm, 2_500.0)
        .with(Feature::FuelConsumption, 9.0)
        .with(Feature::BrakeWear, 40.0)
        .with(Feature::TirePressure, 32.0)
        .with(Feature::BatteryVoltage, 12.6)
        .with(Feature::CoolantLevel, 80.0)
        .with(Feature::DaysSinceLastMaintenance, days)
        .with(Feature::HarshBrakingCount, 10.0)
        .with(Feature::HarshAccelerationCount, 8.0)
        .with(Feature::AverageSpeed, 60.0)
        .with(Feature::IdleTimePercentage, 12.0)
        .with_vehicle_id(id)
}

pub fn healthy_vehicle(id: &str) -> Observation {
    vehicle(id, 85.0, 4.0, 55.0, 30.0)
}

pub fn failing_vehicle(id: &str) -> Observation {
    vehicle(id, 110.0, 9.5, 22.0, 220.0)
}
