use crate::error::{AppError, Result};
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};

/// Per-feature standardization fitted on the training split only.
///
/// Only exists in fitted form: construct it with [`FeatureScaler::fit`] or
/// by deserializing a model bundle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureScaler {
    mean: Array1<f64>,
    /// Population standard deviation; zero-variance columns are stored as 1
    scale: Array1<f64>,
}

impl FeatureScaler {
    /// Compute mean and standard deviation per column
    pub fn fit(x: &Array2<f64>) -> Result<Self> {
        if x.nrows() == 0 {
            return Err(AppError::Training(
                "Cannot fit scaler on an empty matrix".to_string(),
            ));
        }
        if let Some(((row, col), _)) = x.indexed_iter().find(|(_, v)| !v.is_finite()) {
            return Err(AppError::Training(format!(
                "Non-finite value at row {} column {}; scaler not fitted",
                row, col
            )));
        }

        let mean = x
            .mean_axis(Axis(0))
            .ok_or_else(|| AppError::Training("Failed to compute feature means".to_string()))?;
        let scale = x
            .std_axis(Axis(0), 0.0)
            .mapv(|s| if s == 0.0 { 1.0 } else { s });

        Ok(Self { mean, scale })
    }

    pub fn n_features(&self) -> usize {
        self.mean.len()
    }

    pub fn mean(&self) -> ArrayView1<'_, f64> {
        self.mean.view()
    }

    pub fn scale(&self) -> ArrayView1<'_, f64> {
        self.scale.view()
    }

    /// Apply `(x - mean) / std` column-wise
    pub fn transform(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if x.ncols() != self.n_features() {
            return Err(AppError::Validation(format!(
                "Scaler expects {} features, got {}",
                self.n_features(),
                x.ncols()
            )));
        }

        let mut scaled = x.to_owned();
        scaled -= &self.mean;
        scaled /= &self.scale;
        Ok(scaled)
    }

    pub fn fit_transform(x: &Array2<f64>) -> Result<(Self, Array2<f64>)> {
        let scaler = Self::fit(x)?;
        let scaled = scaler.transform(x)?;
        Ok((scaler, scaled))
    }
}
