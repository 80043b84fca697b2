use crate::error::{AppError, Result};
use crate::ml::schema::{Feature, FeatureVectorBuilder, Observation, FEATURE_NAMES};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;

/// Failures within this many days count as "needs maintenance"
pub const MAINTENANCE_HORIZON_DAYS: f64 = 14.0;

/// Ground-truth column in historical data
pub const LABEL_COLUMN: &str = "days_until_failure";

/// Seed for the train/test split. Reported accuracy depends on it.
pub const DEFAULT_SPLIT_SEED: u64 = 42;

/// Fraction of records held out for evaluation
pub const DEFAULT_TEST_SIZE: f64 = 0.2;

/// Ceiling for the maintenance urgency score
pub const MAX_URGENCY_SCORE: u32 = 100;

/// Rule-based 0-100 score computed during data preparation.
///
/// Pure additive scoring, capped at [`MAX_URGENCY_SCORE`]. Absent readings
/// count as 0, as they do in the feature vector.
pub fn maintenance_urgency_score(observation: &Observation) -> u32 {
    let reading = |feature: Feature| observation.get(feature).unwrap_or(0.0);
    let mut score = 0;

    if reading(Feature::EngineTemperature) > 100.0 {
        score += 30;
    }
    if reading(Feature::VibrationLevel) > 8.0 {
        score += 25;
    }
    if reading(Feature::OilPressure) < 30.0 {
        score += 35;
    }
    if reading(Feature::DaysSinceLastMaintenance) > 180.0 {
        score += 20;
    }

    score.min(MAX_URGENCY_SCORE)
}

/// Historical observation with its observed outcome
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRecord {
    pub observation: Observation,
    pub days_until_failure: f64,
}

impl TrainingRecord {
    pub fn new(observation: Observation, days_until_failure: f64) -> Self {
        Self {
            observation,
            days_until_failure,
        }
    }

    /// Binary label: failure within the maintenance horizon
    pub fn needs_maintenance(&self) -> bool {
        self.days_until_failure <= MAINTENANCE_HORIZON_DAYS
    }

    pub fn label(&self) -> usize {
        usize::from(self.needs_maintenance())
    }

    pub fn urgency_score(&self) -> u32 {
        maintenance_urgency_score(&self.observation)
    }
}

/// Ordered collection of historical records
#[derive(Debug, Clone, Default)]
pub struct TrainingDataset {
    records: Vec<TrainingRecord>,
}

impl TrainingDataset {
    pub fn new(records: Vec<TrainingRecord>) -> Self {
        Self { records }
    }

    pub fn records(&self) -> &[TrainingRecord] {
        &self.records
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn push(&mut self, record: TrainingRecord) {
        self.records.push(record);
    }

    /// Load historical data, choosing the parser by file extension.
    ///
    /// `.json` files hold an array of objects; anything else is read as CSV.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let is_json = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.eq_ignore_ascii_case("json"))
            .unwrap_or(false);

        let dataset = if is_json {
            Self::from_json_str(&text)?
        } else {
            Self::from_csv_str(&text)?
        };

        tracing::info!(
            path = %path.display(),
            records = dataset.len(),
            "Loaded training dataset"
        );
        Ok(dataset)
    }

    /// Parse comma-separated records with a header row.
    ///
    /// Every schema column and `days_until_failure` must be present; other
    /// columns are ignored. Quoted fields follow RFC 4180. A row whose cell
    /// count differs from the header, or a cell that is not a finite number,
    /// fails the whole load.
    pub fn from_csv_str(text: &str) -> Result<Self> {
        let mut reader = csv::ReaderBuilder::new()
            .has_headers(true)
            .trim(csv::Trim::All)
            .from_reader(text.as_bytes());

        let columns = reader
            .headers()
            .map_err(|e| AppError::Training(format!("Unreadable header row: {}", e)))?
            .clone();
        if columns.is_empty() {
            return Err(AppError::Training("Dataset has no header row".to_string()));
        }

        let column_of = |name: &str| -> Result<usize> {
            columns
                .iter()
                .position(|c| c == name)
                .ok_or_else(|| AppError::MissingColumn(name.to_string()))
        };

        let feature_columns = FEATURE_NAMES
            .iter()
            .map(|&name| column_of(name))
            .collect::<Result<Vec<usize>>>()?;
        let label_column = column_of(LABEL_COLUMN)?;

        let mut records = Vec::new();
        for row in reader.records() {
            // unequal lengths surface here as well
            let row = row.map_err(|e| AppError::Training(format!("Malformed CSV row: {}", e)))?;
            let line = row.position().map(|p| p.line()).unwrap_or_default();

            let cell = |col: usize| -> Result<f64> {
                let raw = row.get(col).unwrap_or("");
                match raw.parse::<f64>() {
                    Ok(value) if value.is_finite() => Ok(value),
                    _ => Err(AppError::Training(format!(
                        "Invalid value {:?} for column '{}' on line {}",
                        raw, &columns[col], line
                    ))),
                }
            };

            let mut observation = Observation::new();
            for (feature, &col) in Feature::ALL.iter().zip(feature_columns.iter()) {
                observation = observation.with(*feature, cell(col)?);
            }
            records.push(TrainingRecord::new(observation, cell(label_column)?));
        }

        Ok(Self::new(records))
    }

    /// Parse a JSON array of record objects
    pub fn from_json_str(text: &str) -> Result<Self> {
        let rows: Vec<Map<String, Value>> = serde_json::from_str(text)?;
        let mut records = Vec::with_capacity(rows.len());

        for (idx, row) in rows.iter().enumerate() {
            for name in FEATURE_NAMES.iter().chain(std::iter::once(&LABEL_COLUMN)) {
                if !row.contains_key(*name) {
                    return Err(AppError::MissingColumn(format!("{} (record {})", name, idx)));
                }
            }

            let days_until_failure = row
                .get(LABEL_COLUMN)
                .and_then(Value::as_f64)
                .ok_or_else(|| {
                    AppError::Training(format!(
                        "Invalid value for column '{}' in record {}",
                        LABEL_COLUMN, idx
                    ))
                })?;
            let observation = Observation::from_json_map(row);
            if observation.present_count() != FEATURE_NAMES.len() {
                return Err(AppError::Training(format!(
                    "Non-numeric feature value in record {}",
                    idx
                )));
            }

            records.push(TrainingRecord::new(observation, days_until_failure));
        }

        Ok(Self::new(records))
    }
}

/// Shape and label balance of a prepared dataset
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetSummary {
    pub n_records: usize,
    pub n_train: usize,
    pub n_test: usize,
    /// Fraction of records labelled "needs maintenance"
    pub positive_rate: f64,
    /// Mean maintenance urgency score over all records
    pub mean_urgency_score: f64,
}

/// Train/test matrices ready for scaling and fitting
#[derive(Debug, Clone)]
pub struct PreparedSplit {
    pub x_train: Array2<f64>,
    pub x_test: Array2<f64>,
    pub y_train: Array1<usize>,
    pub y_test: Array1<usize>,
    /// Urgency score per training row, aligned with `x_train`
    pub urgency_train: Array1<f64>,
    pub summary: DatasetSummary,
}

/// Derives labels and urgency scores and splits records reproducibly
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DatasetPreparer {
    test_size: f64,
    seed: u64,
}

impl Default for DatasetPreparer {
    fn default() -> Self {
        Self {
            test_size: DEFAULT_TEST_SIZE,
            seed: DEFAULT_SPLIT_SEED,
        }
    }
}

impl DatasetPreparer {
    pub fn new(test_size: f64, seed: u64) -> Result<Self> {
        if !(test_size > 0.0 && test_size < 1.0) {
            return Err(AppError::Configuration(format!(
                "test_size must be in (0, 1), got {}",
                test_size
            )));
        }
        Ok(Self { test_size, seed })
    }

    pub fn test_size(&self) -> f64 {
        self.test_size
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Number of held-out rows for `n` records
    pub fn test_count(&self, n: usize) -> usize {
        (n as f64 * self.test_size).ceil() as usize
    }

    /// Row indices for (train, test), identical for the same seed and input order
    pub fn split_indices(&self, n: usize) -> (Vec<usize>, Vec<usize>) {
        let mut indices: Vec<usize> = (0..n).collect();
        let mut rng = StdRng::seed_from_u64(self.seed);
        indices.shuffle(&mut rng);

        let n_test = self.test_count(n);
        let train = indices.split_off(n_test);
        (train, indices)
    }

    pub fn prepare(&self, dataset: &TrainingDataset) -> Result<PreparedSplit> {
        let n = dataset.len();
        if n < 2 {
            return Err(AppError::Training(format!(
                "At least 2 records are required for a train/test split, got {}",
                n
            )));
        }

        let (train_idx, test_idx) = self.split_indices(n);
        if train_idx.is_empty() || test_idx.is_empty() {
            return Err(AppError::Training(format!(
                "Split of {} records with test_size {} leaves an empty partition",
                n, self.test_size
            )));
        }

        let builder = FeatureVectorBuilder::canonical();
        let x = builder.build_matrix(dataset.records().iter().map(|r| &r.observation));
        let y: Array1<usize> = dataset.records().iter().map(TrainingRecord::label).collect();
        let urgency: Array1<f64> = dataset
            .records()
            .iter()
            .map(|r| f64::from(r.urgency_score()))
            .collect();

        let summary = DatasetSummary {
            n_records: n,
            n_train: train_idx.len(),
            n_test: test_idx.len(),
            positive_rate: y.iter().filter(|&&label| label == 1).count() as f64 / n as f64,
            mean_urgency_score: urgency.mean().unwrap_or(0.0),
        };

        tracing::debug!(
            n_train = summary.n_train,
            n_test = summary.n_test,
            positive_rate = summary.positive_rate,
            "Prepared training split"
        );

        Ok(PreparedSplit {
            x_train: x.select(Axis(0), &train_idx),
            x_test: x.select(Axis(0), &test_idx),
            y_train: y.select(Axis(0), &train_idx),
            y_test: y.select(Axis(0), &test_idx),
            urgency_train: urgency.select(Axis(0), &train_idx),
            summary,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn observation(temp: f64, vibration: f64, oil: f64, days_since: f64) -> Observation {
        Observation::new()
            .with(Feature::EngineTemperature, temp)
            .with(Feature::VibrationLevel, vibration)
            .with(Feature::OilPressure, oil)
            .with(Feature::DaysSinceLastMaintenance, days_since)
    }

    fn csv_header() -> String {
        let mut columns: Vec<&str> = vec!["vehicle_id"];
        columns.extend(FEATURE_NAMES.iter());
        columns.push(LABEL_COLUMN);
        columns.join(",")
    }

    fn csv_row(id: usize, value: f64, days_until_failure: f64) -> String {
        let mut cells = vec![format!("V{}", id)];
        cells.extend(FEATURE_NAMES.iter().map(|_| value.to_string()));
        cells.push(days_until_failure.to_string());
        cells.join(",")
    }

    #[test]
    fn test_urgency_score_capped() {
        let obs = observation(101.0, 9.0, 29.0, 181.0);
        assert_eq!(maintenance_urgency_score(&obs), 100);
    }

    #[test]
    fn test_urgency_score_thresholds_are_strict() {
        assert_eq!(maintenance_urgency_score(&observation(100.0, 8.0, 30.0, 180.0)), 0);
        assert_eq!(maintenance_urgency_score(&observation(100.5, 0.0, 50.0, 0.0)), 30);
        assert_eq!(maintenance_urgency_score(&observation(0.0, 8.1, 50.0, 0.0)), 25);
        assert_eq!(maintenance_urgency_score(&observation(0.0, 0.0, 50.0, 200.0)), 20);
    }

    #[test]
    fn test_absent_oil_pressure_counts_as_low() {
        // Absent readings are 0 here, so a missing oil pressure scores as low.
        let obs = Observation::new();
        assert_eq!(maintenance_urgency_score(&obs), 35);
    }

    #[test]
    fn test_label_horizon_inclusive() {
        let obs = Observation::new();
        assert!(TrainingRecord::new(obs.clone(), 14.0).needs_maintenance());
        assert!(TrainingRecord::new(obs.clone(), 0.0).needs_maintenance());
        assert!(!TrainingRecord::new(obs, 14.5).needs_maintenance());
    }

    #[test]
    fn test_split_is_reproducible() {
        let preparer = DatasetPreparer::default();
        let first = preparer.split_indices(50);
        let second = preparer.split_indices(50);
        assert_eq!(first, second);

        let other = DatasetPreparer::new(0.2, 7).unwrap().split_indices(50);
        assert_ne!(first, other);
    }

    #[test]
    fn test_split_sizes() {
        let preparer = DatasetPreparer::default();
        let (train, test) = preparer.split_indices(101);
        assert_eq!(test.len(), 21);
        assert_eq!(train.len(), 80);

        let mut all: Vec<usize> = train.into_iter().chain(test).collect();
        all.sort_unstable();
        assert_eq!(all, (0..101).collect::<Vec<_>>());
    }

    #[test]
    fn test_prepare_requires_two_records() {
        let dataset = TrainingDataset::new(vec![TrainingRecord::new(Observation::new(), 3.0)]);
        let err = DatasetPreparer::default().prepare(&dataset).unwrap_err();
        assert!(matches!(err, AppError::Training(_)));
    }

    #[test]
    fn test_prepare_shapes_and_summary() {
        let records: Vec<TrainingRecord> = (0..20)
            .map(|i| {
                let obs = observation(90.0 + i as f64, 5.0, 40.0, 10.0);
                TrainingRecord::new(obs, if i % 4 == 0 { 5.0 } else { 60.0 })
            })
            .collect();
        let split = DatasetPreparer::default()
            .prepare(&TrainingDataset::new(records))
            .unwrap();

        assert_eq!(split.x_train.shape(), &[16, FEATURE_NAMES.len()]);
        assert_eq!(split.x_test.shape(), &[4, FEATURE_NAMES.len()]);
        assert_eq!(split.y_train.len(), 16);
        assert_eq!(split.urgency_train.len(), 16);
        assert!((split.summary.positive_rate - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_test_size() {
        assert!(DatasetPreparer::new(0.0, 1).is_err());
        assert!(DatasetPreparer::new(1.0, 1).is_err());
    }

    #[test]
    fn test_csv_parsing() {
        let text = format!(
            "{}\n{}\n{}\n",
            csv_header(),
            csv_row(1, 10.0, 3.0),
            csv_row(2, 20.0, 40.0)
        );
        let dataset = TrainingDataset::from_csv_str(&text).unwrap();

        assert_eq!(dataset.len(), 2);
        assert!(dataset.records()[0].needs_maintenance());
        assert_eq!(
            dataset.records()[1].observation.get(Feature::Mileage),
            Some(20.0)
        );
        // vehicle_id column is not a feature
        assert_eq!(dataset.records()[0].observation.vehicle_id(), None);
    }

    #[test]
    fn test_csv_missing_column() {
        let header = csv_header().replace(",brake_wear", "");
        let err = TrainingDataset::from_csv_str(&header).unwrap_err();
        match err {
            AppError::MissingColumn(name) => assert_eq!(name, "brake_wear"),
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_csv_invalid_cell() {
        let row = csv_row(1, 10.0, 3.0).replacen(",10,", ",abc,", 1);
        let text = format!("{}\n{}\n", csv_header(), row);
        let err = TrainingDataset::from_csv_str(&text).unwrap_err();
        assert!(matches!(err, AppError::Training(_)));
    }

    #[test]
    fn test_csv_quoted_field_keeps_columns_aligned() {
        let row = csv_row(1, 10.0, 60.0).replacen("V1", "\"12,34\"", 1);
        let text = format!("{}\n{}\n", csv_header(), row);
        let dataset = TrainingDataset::from_csv_str(&text).unwrap();

        let record = &dataset.records()[0];
        assert_eq!(record.observation.get(Feature::EngineTemperature), Some(10.0));
        assert_eq!(record.observation.get(Feature::IdleTimePercentage), Some(10.0));
        assert_eq!(record.days_until_failure, 60.0);
        assert!(!record.needs_maintenance());
    }

    #[test]
    fn test_csv_ragged_row_rejected() {
        let short = csv_row(1, 10.0, 3.0).replacen(",10", "", 1);
        let long = format!("{},7", csv_row(2, 10.0, 3.0));

        for row in [short, long] {
            let text = format!("{}\n{}\n", csv_header(), row);
            let err = TrainingDataset::from_csv_str(&text).unwrap_err();
            assert!(matches!(err, AppError::Training(_)), "row {row:?} gave {err}");
        }
    }

    #[test]
    fn test_csv_non_finite_cell_rejected() {
        for bad in ["NaN", "inf", "-infinity"] {
            let row = csv_row(1, 10.0, 3.0).replacen(",10,", &format!(",{},", bad), 1);
            let text = format!("{}\n{}\n", csv_header(), row);
            match TrainingDataset::from_csv_str(&text) {
                Err(AppError::Training(message)) => {
                    assert!(message.contains("engine_temperature"), "{message}");
                    assert!(message.contains("line 2"), "{message}");
                }
                other => panic!("{bad} was accepted: {other:?}"),
            }
        }
    }

    #[test]
    fn test_json_parsing_and_missing_label() {
        let mut row = Map::new();
        for name in FEATURE_NAMES {
            row.insert(name.to_string(), Value::from(1.5));
        }
        row.insert(LABEL_COLUMN.to_string(), Value::from(12));
        let text = serde_json::to_string(&vec![row.clone()]).unwrap();
        let dataset = TrainingDataset::from_json_str(&text).unwrap();
        assert_eq!(dataset.len(), 1);
        assert!(dataset.records()[0].needs_maintenance());

        row.remove(LABEL_COLUMN);
        let text = serde_json::to_string(&vec![row]).unwrap();
        assert!(matches!(
            TrainingDataset::from_json_str(&text),
            Err(AppError::MissingColumn(_))
        ));
    }
}
