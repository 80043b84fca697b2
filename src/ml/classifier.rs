use crate::error::{AppError, Result};
use linfa::prelude::*;
use linfa_trees::{DecisionTree, SplitQuality};
use ndarray::{Array1, Array2, Axis};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Trait for binary classifiers over scaled feature matrices
pub trait Classifier: Send + Sync {
    /// Train the classifier
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()>;

    /// Predict class labels (0 or 1)
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>>;

    /// Probability of class 1 per row
    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Check if model is trained
    fn is_trained(&self) -> bool;
}

/// Fraction of rows where the predicted label equals the truth
pub fn accuracy<C: Classifier + ?Sized>(
    model: &C,
    x: &Array2<f64>,
    y: &Array1<usize>,
) -> Result<f64> {
    if x.nrows() == 0 {
        return Ok(0.0);
    }
    let predictions = model.predict(x)?;
    let correct = predictions
        .iter()
        .zip(y.iter())
        .filter(|(p, t)| p == t)
        .count();
    Ok(correct as f64 / x.nrows() as f64)
}

/// Fixed forest hyperparameters.
///
/// These are policy constants and are not tuned per training run.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ForestParams {
    pub n_trees: usize,
    pub max_depth: usize,
    /// Minimum (weighted) samples required to split a node
    pub min_weight_split: f32,
    /// Minimum (weighted) samples required in a leaf
    pub min_weight_leaf: f32,
    pub seed: u64,
    /// Reweight classes inversely to their frequency
    pub balanced_class_weight: bool,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_trees: 200,
            max_depth: 15,
            min_weight_split: 5.0,
            min_weight_leaf: 2.0,
            seed: 42,
            balanced_class_weight: true,
        }
    }
}

/// Per-sample weights `n / (k * n_c)` for the class of each row.
///
/// `k` is the number of classes present. With one class every weight is 1.
pub fn balanced_sample_weights(y: &Array1<usize>) -> Array1<f32> {
    let n = y.len();
    let positives = y.iter().filter(|&&label| label == 1).count();
    let negatives = n - positives;

    if positives == 0 || negatives == 0 {
        return Array1::ones(n);
    }

    let w_pos = n as f64 / (2.0 * positives as f64);
    let w_neg = n as f64 / (2.0 * negatives as f64);
    y.mapv(|label| if label == 1 { w_pos as f32 } else { w_neg as f32 })
}

/// Bagged ensemble of Gini decision trees.
///
/// Each tree owns a seed derived from the forest seed and its index, so the
/// result does not depend on how rayon schedules the work.
///
/// Two differences from a textbook random forest:
///
/// - Every split considers all feature columns. linfa-trees has no per-split
///   feature subsampling, so trees decorrelate through bootstrap rows only.
/// - [`Classifier::predict_proba`] is hard voting. Each tree casts one vote
///   and the probability is the share of trees voting "needs maintenance", so
///   it moves in steps of `1 / n_trees`. Leaf class frequencies are not kept
///   by the fitted trees, so soft voting is not available.
#[derive(Serialize, Deserialize)]
pub struct RandomForestClassifier {
    params: ForestParams,
    trees: Vec<DecisionTree<f64, usize>>,
    n_features: usize,
    feature_importance: Vec<f64>,
}

impl RandomForestClassifier {
    pub fn new(params: ForestParams) -> Self {
        Self {
            params,
            trees: Vec::new(),
            n_features: 0,
            feature_importance: Vec::new(),
        }
    }

    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    /// Mean impurity-based importance per feature column
    pub fn feature_importance(&self) -> &[f64] {
        &self.feature_importance
    }

    /// Importances paired with names, most important first
    pub fn ranked_importance(&self, names: &[String]) -> Vec<(String, f64)> {
        let mut ranked: Vec<(String, f64)> = names
            .iter()
            .cloned()
            .zip(self.feature_importance.iter().copied())
            .collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked
    }

    fn fit_tree(
        &self,
        index: usize,
        x: &Array2<f64>,
        y: &Array1<usize>,
        weights: &Array1<f32>,
    ) -> Result<DecisionTree<f64, usize>> {
        let n = x.nrows();
        let mut rng = StdRng::seed_from_u64(self.params.seed.wrapping_add(index as u64));
        let bootstrap: Vec<usize> = (0..n).map(|_| rng.gen_range(0..n)).collect();

        let dataset = Dataset::new(
            x.select(Axis(0), &bootstrap),
            y.select(Axis(0), &bootstrap),
        )
        .with_weights(weights.select(Axis(0), &bootstrap));

        DecisionTree::<f64, usize>::params()
            .split_quality(SplitQuality::Gini)
            .max_depth(Some(self.params.max_depth))
            .min_weight_split(self.params.min_weight_split)
            .min_weight_leaf(self.params.min_weight_leaf)
            .fit(&dataset)
            .map_err(|e: linfa::error::Error| {
                AppError::Training(format!("Failed to train decision tree {}: {}", index, e))
            })
    }

    fn check_width(&self, x: &Array2<f64>) -> Result<()> {
        if x.ncols() != self.n_features {
            return Err(AppError::Validation(format!(
                "Classifier expects {} features, got {}",
                self.n_features,
                x.ncols()
            )));
        }
        Ok(())
    }
}

impl Default for RandomForestClassifier {
    fn default() -> Self {
        Self::new(ForestParams::default())
    }
}

impl Classifier for RandomForestClassifier {
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<usize>) -> Result<()> {
        if x.nrows() == 0 {
            return Err(AppError::Training("No training samples provided".to_string()));
        }
        if x.nrows() != y.len() {
            return Err(AppError::Training(format!(
                "Feature rows ({}) and labels ({}) differ",
                x.nrows(),
                y.len()
            )));
        }
        if self.params.n_trees == 0 {
            return Err(AppError::Training("Forest needs at least one tree".to_string()));
        }

        let weights = if self.params.balanced_class_weight {
            balanced_sample_weights(y)
        } else {
            Array1::ones(y.len())
        };

        let trees = (0..self.params.n_trees)
            .into_par_iter()
            .map(|index| self.fit_tree(index, x, y, &weights))
            .collect::<Result<Vec<_>>>()?;

        let n_features = x.ncols();
        let mut importance = vec![0.0; n_features];
        for tree in &trees {
            for (slot, value) in importance.iter_mut().zip(tree.feature_importance()) {
                *slot += value;
            }
        }
        let n_trees = trees.len() as f64;
        importance.iter_mut().for_each(|v| *v /= n_trees);

        self.trees = trees;
        self.n_features = n_features;
        self.feature_importance = importance;
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<usize>> {
        let proba = self.predict_proba(x)?;
        Ok(proba.mapv(|p| usize::from(p > 0.5)))
    }

    fn predict_proba(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_trained() {
            return Err(AppError::ModelNotLoaded);
        }
        self.check_width(x)?;

        let mut votes = Array1::<f64>::zeros(x.nrows());
        for tree in &self.trees {
            let predicted: Array1<usize> = tree.predict(x);
            votes.zip_mut_with(&predicted, |acc, &label| {
                if label == 1 {
                    *acc += 1.0;
                }
            });
        }
        Ok(votes / self.trees.len() as f64)
    }

    fn is_trained(&self) -> bool {
        !self.trees.is_empty()
    }
}

impl std::fmt::Debug for RandomForestClassifier {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RandomForestClassifier")
            .field("params", &self.params)
            .field("n_trees", &self.trees.len())
            .field("n_features", &self.n_features)
            .finish()
    }
}
