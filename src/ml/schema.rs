use crate::error::{AppError, Result};
use lazy_static::lazy_static;
use ndarray::{Array1, Array2, Axis};
use serde::de::Deserializer;
use serde::ser::{SerializeMap, Serializer};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashMap;

/// Number of inputs in the canonical feature layout
pub const FEATURE_COUNT: usize = 15;

/// Canonical, ordered feature names.
///
/// Every persisted model depends on this exact order and length.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "engine_temperature",
    "vibration_level",
    "oil_pressure",
    "mileage",
    "engine_rpm",
    "fuel_consumption",
    "brake_wear",
    "tire_pressure",
    "battery_voltage",
    "coolant_level",
    "days_since_last_maintenance",
    "harsh_braking_count",
    "harsh_acceleration_count",
    "average_speed",
    "idle_time_percentage",
];

/// Key carried through from requests to results, never used as a feature
pub const VEHICLE_ID_KEY: &str = "vehicle_id";

lazy_static! {
    static ref CANONICAL_SCHEMA: FeatureSchema = FeatureSchema::from_names(FEATURE_NAMES);
}

/// Typed handle on one slot of the canonical layout
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Feature {
    EngineTemperature,
    VibrationLevel,
    OilPressure,
    Mileage,
    EngineRpm,
    FuelConsumption,
    BrakeWear,
    TirePressure,
    BatteryVoltage,
    CoolantLevel,
    DaysSinceLastMaintenance,
    HarshBrakingCount,
    HarshAccelerationCount,
    AverageSpeed,
    IdleTimePercentage,
}

impl Feature {
    /// All features in canonical order
    pub const ALL: [Feature; FEATURE_COUNT] = [
        Feature::EngineTemperature,
        Feature::VibrationLevel,
        Feature::OilPressure,
        Feature::Mileage,
        Feature::EngineRpm,
        Feature::FuelConsumption,
        Feature::BrakeWear,
        Feature::TirePressure,
        Feature::BatteryVoltage,
        Feature::CoolantLevel,
        Feature::DaysSinceLastMaintenance,
        Feature::HarshBrakingCount,
        Feature::HarshAccelerationCount,
        Feature::AverageSpeed,
        Feature::IdleTimePercentage,
    ];

    /// Position in the canonical layout
    pub fn index(self) -> usize {
        self as usize
    }

    pub fn name(self) -> &'static str {
        FEATURE_NAMES[self.index()]
    }

    pub fn from_name(name: &str) -> Option<Self> {
        CANONICAL_SCHEMA.position(name).map(|idx| Self::ALL[idx])
    }
}

impl std::fmt::Display for Feature {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// Ordered list of feature names with a name -> position table
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureSchema {
    names: Vec<String>,
    positions: HashMap<String, usize>,
}

impl FeatureSchema {
    /// The schema compiled into this binary
    pub fn canonical() -> &'static FeatureSchema {
        &CANONICAL_SCHEMA
    }

    /// Build a schema from an ordered list of names.
    ///
    /// Duplicate names keep the position of their first occurrence.
    pub fn from_names<I, S>(names: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let names: Vec<String> = names.into_iter().map(Into::into).collect();
        let mut positions = HashMap::with_capacity(names.len());
        for (idx, name) in names.iter().enumerate() {
            positions.entry(name.clone()).or_insert(idx);
        }
        Self { names, positions }
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }

    pub fn is_empty(&self) -> bool {
        self.names.is_empty()
    }

    /// Position of a feature name, if it belongs to the schema
    pub fn position(&self, name: &str) -> Option<usize> {
        self.positions.get(name).copied()
    }

    /// Check a persisted feature list against this schema.
    ///
    /// Order matters: the same names in a different order are a mismatch.
    pub fn validate(&self, found: &[String]) -> Result<()> {
        if self.names.as_slice() == found {
            Ok(())
        } else {
            Err(AppError::SchemaMismatch {
                expected: self.names.clone(),
                found: found.to_vec(),
            })
        }
    }
}

/// One snapshot of sensor and usage readings for a vehicle.
///
/// Values are stored by canonical slot. Keys outside the schema are dropped
/// at construction, except `vehicle_id` which is kept as a passthrough.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Observation {
    values: [Option<f64>; FEATURE_COUNT],
    vehicle_id: Option<String>,
}

impl Observation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builder-style setter for a known feature
    pub fn with(mut self, feature: Feature, value: f64) -> Self {
        self.values[feature.index()] = Some(value);
        self
    }

    pub fn with_vehicle_id(mut self, vehicle_id: impl Into<String>) -> Self {
        self.vehicle_id = Some(vehicle_id.into());
        self
    }

    /// Set a value by name. Returns false when the name is not a feature.
    pub fn set(&mut self, name: &str, value: f64) -> bool {
        match Feature::from_name(name) {
            Some(feature) => {
                self.values[feature.index()] = Some(value);
                true
            }
            None => false,
        }
    }

    /// Raw reading, `None` when the field was absent
    pub fn get(&self, feature: Feature) -> Option<f64> {
        self.values[feature.index()]
    }

    /// Raw reading by name
    pub fn get_by_name(&self, name: &str) -> Option<f64> {
        Feature::from_name(name).and_then(|f| self.get(f))
    }

    pub fn vehicle_id(&self) -> Option<&str> {
        self.vehicle_id.as_deref()
    }

    /// Number of schema fields present
    pub fn present_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_some()).count()
    }

    /// Build from name/value pairs, ignoring unknown names
    pub fn from_pairs<I, K>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, f64)>,
        K: AsRef<str>,
    {
        let mut obs = Self::new();
        for (name, value) in pairs {
            obs.set(name.as_ref(), value);
        }
        obs
    }

    /// Build from a JSON object.
    ///
    /// Numbers and numeric strings are accepted for schema fields; anything
    /// else is treated as absent. `vehicle_id` may be a string or a number.
    pub fn from_json_map(map: &Map<String, Value>) -> Self {
        let mut obs = Self::new();
        for (key, value) in map {
            if key == VEHICLE_ID_KEY {
                obs.vehicle_id = match value {
                    Value::String(s) => Some(s.clone()),
                    Value::Number(n) => Some(n.to_string()),
                    _ => None,
                };
                continue;
            }
            if let Some(v) = numeric_value(value) {
                obs.set(key, v);
            }
        }
        obs
    }

    /// Build from an arbitrary JSON value; non-objects are rejected
    pub fn from_json(value: &Value) -> Result<Self> {
        match value {
            Value::Object(map) => Ok(Self::from_json_map(map)),
            other => Err(AppError::Validation(format!(
                "Observation must be a JSON object, got {}",
                json_kind(other)
            ))),
        }
    }
}

fn numeric_value(value: &Value) -> Option<f64> {
    match value {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse::<f64>().ok(),
        _ => None,
    }
    .filter(|v| v.is_finite())
}

fn json_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

impl Serialize for Observation {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        let len = self.present_count() + usize::from(self.vehicle_id.is_some());
        let mut map = serializer.serialize_map(Some(len))?;
        if let Some(id) = &self.vehicle_id {
            map.serialize_entry(VEHICLE_ID_KEY, id)?;
        }
        for feature in Feature::ALL {
            if let Some(v) = self.get(feature) {
                map.serialize_entry(feature.name(), &v)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for Observation {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> std::result::Result<Self, D::Error> {
        let map = Map::<String, Value>::deserialize(deserializer)?;
        Ok(Self::from_json_map(&map))
    }
}

/// Fixed-length numeric input in schema order
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector(Vec<f64>);

impl FeatureVector {
    pub fn as_slice(&self) -> &[f64] {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn to_array(&self) -> Array1<f64> {
        Array1::from_vec(self.0.clone())
    }

    /// Single-row matrix for model input
    pub fn to_row(&self) -> Array2<f64> {
        self.to_array().insert_axis(Axis(0))
    }
}

/// Maps observations onto a schema's layout.
///
/// The slot table is resolved once per builder. A schema name without a
/// canonical slot always yields 0.
///
/// Known limitation: a field that was omitted and a field that is
/// legitimately zero produce the same vector.
#[derive(Debug, Clone)]
pub struct FeatureVectorBuilder {
    slots: Vec<Option<usize>>,
}

impl FeatureVectorBuilder {
    pub fn new(schema: &FeatureSchema) -> Self {
        let slots = schema
            .names()
            .iter()
            .map(|name| Feature::from_name(name).map(Feature::index))
            .collect();
        Self { slots }
    }

    /// Builder over the compiled schema
    pub fn canonical() -> Self {
        Self::new(FeatureSchema::canonical())
    }

    pub fn width(&self) -> usize {
        self.slots.len()
    }

    pub fn build(&self, observation: &Observation) -> FeatureVector {
        let values = self
            .slots
            .iter()
            .map(|&slot| match slot.and_then(|idx| observation.values[idx]) {
                Some(value) => value,
                None => 0.0,
            })
            .collect();
        FeatureVector(values)
    }

    /// Stack observations into an (n_samples x width) matrix
    pub fn build_matrix<'a, I>(&self, observations: I) -> Array2<f64>
    where
        I: IntoIterator<Item = &'a Observation>,
    {
        let rows: Vec<FeatureVector> = observations.into_iter().map(|o| self.build(o)).collect();
        let mut matrix = Array2::zeros((rows.len(), self.width()));
        for (i, row) in rows.iter().enumerate() {
            for (j, &value) in row.as_slice().iter().enumerate() {
                matrix[[i, j]] = value;
            }
        }
        matrix
    }
}
