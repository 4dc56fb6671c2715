//! Gradient-boosted regression trees.
//!
//! Squared loss: each round fits a [`RegressionTree`] to the current
//! residuals on a row and column subsample, and adds it with shrinkage
//! `learning_rate`.

use crate::error::{ModelError, Result};
use crate::regressor::{Regressor, TreeAttribution, check_features, check_training_data};
use crate::tree::{RegressionTree, TreeConfig};
use ndarray::{Array1, Array2, Axis};
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use serde::{Deserialize, Serialize};
use volcast_eval::mean_absolute_error;

/// Gradient boosting configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GradientBoostingConfig {
    /// Number of boosting rounds (default: 100)
    pub n_estimators: usize,
    /// Shrinkage applied to each tree (default: 0.1)
    pub learning_rate: f64,
    /// Maximum tree depth (default: 4)
    pub max_depth: usize,
    /// Minimum rows per leaf (default: 1)
    pub min_samples_leaf: usize,
    /// Fraction of rows sampled per round (default: 1.0)
    pub subsample: f64,
    /// Fraction of columns sampled per round (default: 1.0)
    pub colsample: f64,
    /// Stop after this many rounds without validation improvement
    pub early_stopping_rounds: Option<usize>,
    /// Seed for row and column sampling (default: 42)
    pub random_seed: u64,
}

impl Default for GradientBoostingConfig {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 4,
            min_samples_leaf: 1,
            subsample: 1.0,
            colsample: 1.0,
            early_stopping_rounds: None,
            random_seed: 42,
        }
    }
}

impl GradientBoostingConfig {
    /// Check ranges of every option.
    pub fn validate(&self) -> Result<()> {
        if self.n_estimators == 0 {
            return Err(ModelError::Config("n_estimators must be positive".to_string()));
        }
        if !(self.learning_rate.is_finite() && self.learning_rate > 0.0) {
            return Err(ModelError::Config(format!(
                "learning_rate must be positive, got {}",
                self.learning_rate
            )));
        }
        for (name, value) in [("subsample", self.subsample), ("colsample", self.colsample)] {
            if !(value > 0.0 && value <= 1.0) {
                return Err(ModelError::Config(format!(
                    "{name} must be in (0, 1], got {value}"
                )));
            }
        }
        if self.early_stopping_rounds == Some(0) {
            return Err(ModelError::Config(
                "early_stopping_rounds must be positive".to_string(),
            ));
        }
        self.tree_config().validate()
    }

    fn tree_config(&self) -> TreeConfig {
        TreeConfig {
            max_depth: self.max_depth,
            min_samples_leaf: self.min_samples_leaf,
            ..Default::default()
        }
    }
}

/// Gradient-boosted trees regressor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GradientBoostedTrees {
    config: GradientBoostingConfig,
    initial_prediction: f64,
    trees: Vec<RegressionTree>,
    columns: Vec<Vec<usize>>,
    n_features: usize,
    best_iteration: Option<usize>,
    fitted: bool,
}

impl Default for GradientBoostedTrees {
    fn default() -> Self {
        Self::new(GradientBoostingConfig::default())
    }
}

impl GradientBoostedTrees {
    /// Create an unfitted model.
    pub const fn new(config: GradientBoostingConfig) -> Self {
        Self {
            config,
            initial_prediction: 0.0,
            trees: Vec::new(),
            columns: Vec::new(),
            n_features: 0,
            best_iteration: None,
            fitted: false,
        }
    }

    /// Get the configuration.
    pub const fn config(&self) -> &GradientBoostingConfig {
        &self.config
    }

    /// Number of trees kept after fitting.
    pub fn n_trees(&self) -> usize {
        self.trees.len()
    }

    /// Zero-based round with the lowest validation MAE, when a validation
    /// set was used.
    pub const fn best_iteration(&self) -> Option<usize> {
        self.best_iteration
    }

    /// Split-gain importances summed over trees and normalized to 1.
    pub fn feature_importances(&self) -> Vec<f64> {
        let mut importances = vec![0.0; self.n_features];
        for (tree, columns) in self.trees.iter().zip(&self.columns) {
            for (j, &column) in columns.iter().enumerate() {
                importances[column] += tree.split_gains()[j];
            }
        }
        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }
        importances
    }

    fn sample(n: usize, fraction: f64, rng: &mut StdRng) -> Vec<usize> {
        let mut indices: Vec<usize> = (0..n).collect();
        if fraction < 1.0 {
            let size = ((n as f64) * fraction).ceil().max(1.0) as usize;
            indices.shuffle(rng);
            indices.truncate(size);
            indices.sort_unstable();
        }
        indices
    }

    /// Fit, tracking MAE on `eval` after every round.
    ///
    /// With `early_stopping_rounds` set, training stops once that many rounds
    /// pass without improvement and the ensemble is truncated to the best
    /// round.
    pub fn fit_with_eval(
        &mut self,
        x: &Array2<f64>,
        y: &Array1<f64>,
        eval: Option<(&Array2<f64>, &Array1<f64>)>,
    ) -> Result<()> {
        self.config.validate()?;
        check_training_data(x, y)?;
        if let Some((x_eval, y_eval)) = eval {
            check_training_data(x_eval, y_eval)?;
            check_features(x_eval, x.ncols())?;
        }

        let n_samples = x.nrows();
        self.n_features = x.ncols();
        self.trees.clear();
        self.columns.clear();
        self.best_iteration = None;
        self.fitted = false;

        self.initial_prediction = y.mean().unwrap_or(0.0);
        let mut predictions = Array1::from_elem(n_samples, self.initial_prediction);
        let mut eval_predictions =
            eval.map(|(x_eval, _)| Array1::from_elem(x_eval.nrows(), self.initial_prediction));

        let mut rng = StdRng::seed_from_u64(self.config.random_seed);
        let lr = self.config.learning_rate;
        let mut best: Option<(usize, f64)> = None;

        for round in 0..self.config.n_estimators {
            let residuals = y - &predictions;
            let rows = Self::sample(n_samples, self.config.subsample, &mut rng);
            let columns = Self::sample(self.n_features, self.config.colsample, &mut rng);

            let x_cols = x.select(Axis(1), &columns);
            let x_sub = x_cols.select(Axis(0), &rows);
            let y_sub = residuals.select(Axis(0), &rows);

            let mut tree = RegressionTree::new(self.config.tree_config());
            tree.fit(&x_sub, &y_sub)?;

            predictions.scaled_add(lr, &tree.predict(&x_cols)?);

            if let (Some((x_eval, y_eval)), Some(eval_pred)) = (eval, eval_predictions.as_mut()) {
                eval_pred.scaled_add(lr, &tree.predict(&x_eval.select(Axis(1), &columns))?);
                let score = mean_absolute_error(&y_eval.to_vec(), &eval_pred.to_vec())?;
                if best.is_none_or(|(_, s)| score < s) {
                    best = Some((round, score));
                }
            }

            self.trees.push(tree);
            self.columns.push(columns);

            if let (Some(patience), Some((best_round, _))) = (self.config.early_stopping_rounds, best) {
                if round - best_round >= patience {
                    tracing::debug!(round, best_round, "early stopping");
                    break;
                }
            }
        }

        if let Some((best_round, score)) = best {
            self.best_iteration = Some(best_round);
            if self.config.early_stopping_rounds.is_some() {
                self.trees.truncate(best_round + 1);
                self.columns.truncate(best_round + 1);
            }
            tracing::debug!(best_round, validation_mae = score, trees = self.trees.len(), "boosting finished");
        }

        self.fitted = true;
        Ok(())
    }
}

impl Regressor for GradientBoostedTrees {
    fn name(&self) -> &str {
        "gradient_boosting"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.fit_with_eval(x, y, None)
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.fitted {
            return Err(ModelError::NotFitted);
        }
        check_features(x, self.n_features)?;

        let mut predictions = Array1::from_elem(x.nrows(), self.initial_prediction);
        for (tree, columns) in self.trees.iter().zip(&self.columns) {
            let tree_pred = tree.predict(&x.select(Axis(1), columns))?;
            predictions.scaled_add(self.config.learning_rate, &tree_pred);
        }
        Ok(predictions)
    }

    fn is_fitted(&self) -> bool {
        self.fitted
    }
}

impl TreeAttribution for GradientBoostedTrees {
    fn attributions(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.fitted {
            return Err(ModelError::NotFitted);
        }
        check_features(x, self.n_features)?;

        let mut out = Array2::zeros(x.raw_dim());
        for (tree, columns) in self.trees.iter().zip(&self.columns) {
            let local = tree.attributions(&x.select(Axis(1), columns))?;
            for (j, &column) in columns.iter().enumerate() {
                out.column_mut(column)
                    .scaled_add(self.config.learning_rate, &local.column(j));
            }
        }
        Ok(out)
    }

    fn expected_value(&self) -> Result<f64> {
        if !self.fitted {
            return Err(ModelError::NotFitted);
        }
        let mut value = self.initial_prediction;
        for tree in &self.trees {
            value += self.config.learning_rate * tree.root_value()?;
        }
        Ok(value)
    }
}
