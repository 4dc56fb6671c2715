//! Grid search over model configurations.
//!
//! Every candidate is fitted independently and scored by MAE, either on a
//! holdout validation set or as the mean over expanding time-series folds.
//! The lowest score wins; ties keep the earlier candidate.

use crate::boosting::{GradientBoostedTrees, GradientBoostingConfig};
use crate::error::{ModelError, Result};
use crate::parallel::map_slice;
use crate::regressor::Regressor;
use ndarray::{Array1, Array2, Axis, s};
use serde::{Deserialize, Serialize};
use std::fmt::Debug;
use std::ops::Range;
use volcast_eval::mean_absolute_error;

/// One train/test split of a time-ordered matrix.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fold {
    /// Training rows
    pub train: Range<usize>,
    /// Scoring rows
    pub test: Range<usize>,
}

/// How candidates are scored.
#[derive(Debug, Clone, Copy)]
pub enum Validation<'a> {
    /// Fit on the training set, score on the validation set
    Holdout {
        /// Training features
        x_train: &'a Array2<f64>,
        /// Training target
        y_train: &'a Array1<f64>,
        /// Validation features
        x_val: &'a Array2<f64>,
        /// Validation target
        y_val: &'a Array1<f64>,
    },
    /// Mean score over folds of one matrix
    Folds {
        /// Features
        x: &'a Array2<f64>,
        /// Target
        y: &'a Array1<f64>,
        /// Row ranges to fit and score on
        folds: &'a [Fold],
    },
}

/// A candidate with its validation score.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Scored<C> {
    /// Candidate configuration
    pub params: C,
    /// Validation MAE (mean over folds for fold validation)
    pub score: f64,
}

/// Outcome of a grid search.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchResult<C> {
    /// Lowest-scoring candidate
    pub best: Scored<C>,
    /// Every candidate in input order
    pub all: Vec<Scored<C>>,
}

fn fit_and_score<M: Regressor>(
    model: &mut M,
    x_train: &Array2<f64>,
    y_train: &Array1<f64>,
    x_test: &Array2<f64>,
    y_test: &Array1<f64>,
) -> Result<f64> {
    model.fit(x_train, y_train)?;
    let pred = model.predict(x_test)?;
    Ok(mean_absolute_error(&y_test.to_vec(), &pred.to_vec())?)
}

/// Parallel grid search.
#[derive(Debug, Clone, Default)]
pub struct GridSearch {
    force_sequential: bool,
}

impl GridSearch {
    /// Create a grid search.
    pub fn new() -> Self {
        Self::default()
    }

    /// Evaluate candidates one at a time.
    pub const fn with_force_sequential(mut self, force_sequential: bool) -> Self {
        self.force_sequential = force_sequential;
        self
    }

    /// Score every candidate; `build` creates a fresh model for one.
    pub fn run<C, M, F>(
        &self,
        candidates: &[C],
        validation: Validation<'_>,
        build: F,
    ) -> Result<SearchResult<C>>
    where
        C: Clone + Debug + Sync,
        M: Regressor,
        F: Fn(&C) -> M + Sync + Send,
    {
        if candidates.is_empty() {
            return Err(ModelError::Config("grid search needs at least one candidate".to_string()));
        }
        if let Validation::Folds { folds, x, .. } = validation {
            if folds.is_empty() {
                return Err(ModelError::Config("fold validation needs at least one fold".to_string()));
            }
            if let Some(fold) = folds.iter().find(|f| f.train.is_empty() || f.test.is_empty() || f.test.end > x.nrows()) {
                return Err(ModelError::InvalidInput(format!("invalid fold {fold:?}")));
            }
        }

        let scores = map_slice(
            candidates,
            |candidate| self.score(candidate, validation, &build),
            self.force_sequential,
        );

        let mut all = Vec::with_capacity(candidates.len());
        for (candidate, score) in candidates.iter().zip(scores) {
            let score = score?;
            tracing::debug!(?candidate, score, "candidate scored");
            all.push(Scored {
                params: candidate.clone(),
                score,
            });
        }

        let best = all
            .iter()
            .fold(None::<&Scored<C>>, |best, c| match best {
                Some(b) if b.score <= c.score => Some(b),
                _ => Some(c),
            })
            .cloned()
            .ok_or_else(|| ModelError::Config("no candidate scored".to_string()))?;
        tracing::info!(candidates = all.len(), best_score = best.score, "grid search finished");

        Ok(SearchResult { best, all })
    }

    fn score<C, M, F>(&self, candidate: &C, validation: Validation<'_>, build: &F) -> Result<f64>
    where
        M: Regressor,
        F: Fn(&C) -> M,
    {
        match validation {
            Validation::Holdout {
                x_train,
                y_train,
                x_val,
                y_val,
            } => fit_and_score(&mut build(candidate), x_train, y_train, x_val, y_val),
            Validation::Folds { x, y, folds } => {
                let mut total = 0.0;
                for fold in folds {
                    let x_train = x.slice(s![fold.train.clone(), ..]).to_owned();
                    let y_train = y.slice(s![fold.train.clone()]).to_owned();
                    let x_test = x.select(Axis(0), &fold.test.clone().collect::<Vec<_>>());
                    let y_test = y.slice(s![fold.test.clone()]).to_owned();
                    total += fit_and_score(&mut build(candidate), &x_train, &y_train, &x_test, &y_test)?;
                }
                Ok(total / folds.len() as f64)
            }
        }
    }
}

/// Cartesian grid over the main boosting options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GbtGrid {
    /// Boosting rounds (default: [100])
    pub n_estimators: Vec<usize>,
    /// Tree depths (default: [3, 4])
    pub max_depth: Vec<usize>,
    /// Learning rates (default: [0.09, 0.1])
    pub learning_rate: Vec<f64>,
}

impl Default for GbtGrid {
    fn default() -> Self {
        Self {
            n_estimators: vec![100],
            max_depth: vec![3, 4],
            learning_rate: vec![0.09, 0.1],
        }
    }
}

impl GbtGrid {
    /// Every combination applied on top of `base`, in nested order
    /// (`n_estimators`, then `max_depth`, then `learning_rate`).
    pub fn candidates(&self, base: &GradientBoostingConfig) -> Vec<GradientBoostingConfig> {
        let mut out = Vec::new();
        for &n_estimators in &self.n_estimators {
            for &max_depth in &self.max_depth {
                for &learning_rate in &self.learning_rate {
                    out.push(GradientBoostingConfig {
                        n_estimators,
                        max_depth,
                        learning_rate,
                        ..base.clone()
                    });
                }
            }
        }
        out
    }

    /// Search the grid with boosted trees.
    pub fn search(
        &self,
        base: &GradientBoostingConfig,
        validation: Validation<'_>,
        search: &GridSearch,
    ) -> Result<SearchResult<GradientBoostingConfig>> {
        let candidates = self.candidates(base);
        search.run(&candidates, validation, |config| {
            GradientBoostedTrees::new(config.clone())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    /// Predicts a constant; scores are known in advance.
    #[derive(Debug)]
    struct Constant {
        value: f64,
        fitted: bool,
    }

    impl Regressor for Constant {
        fn name(&self) -> &str {
            "constant"
        }

        fn fit(&mut self, _x: &Array2<f64>, _y: &Array1<f64>) -> Result<()> {
            self.fitted = true;
            Ok(())
        }

        fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
            Ok(Array1::from_elem(x.nrows(), self.value))
        }

        fn is_fitted(&self) -> bool {
            self.fitted
        }
    }

    fn data() -> (Array2<f64>, Array1<f64>) {
        let x = Array2::from_shape_fn((20, 1), |(i, _)| i as f64);
        let y = Array1::from_elem(20, 3.0);
        (x, y)
    }

    #[rstest]
    #[case(false)]
    #[case(true)]
    fn test_picks_minimum_holdout_score(#[case] sequential: bool) {
        let (x, y) = data();
        let candidates = vec![0.0, 2.5, 3.0, 4.0];
        let result = GridSearch::new()
            .with_force_sequential(sequential)
            .run(
                &candidates,
                Validation::Holdout {
                    x_train: &x,
                    y_train: &y,
                    x_val: &x,
                    y_val: &y,
                },
                |&value| Constant { value, fitted: false },
            )
            .unwrap();
        assert_eq!(result.best.params, 3.0);
        assert_eq!(result.best.score, 0.0);
        assert_eq!(result.all.len(), 4);
        assert_eq!(result.all[0].score, 3.0);
    }

    #[test]
    fn test_fold_scores_are_averaged() {
        let (x, y) = data();
        let folds = vec![
            Fold { train: 0..5, test: 5..10 },
            Fold { train: 0..10, test: 10..15 },
        ];
        let result = GridSearch::new()
            .run(
                &[1.0, 5.5],
                Validation::Folds { x: &x, y: &y, folds: &folds },
                |&value| Constant { value, fitted: false },
            )
            .unwrap();
        assert_eq!(result.best.params, 1.0);
        assert_eq!(result.best.score, 2.0);
    }

    #[test]
    fn test_ties_keep_first() {
        let (x, y) = data();
        let result = GridSearch::new()
            .run(
                &[2.0, 4.0],
                Validation::Holdout { x_train: &x, y_train: &y, x_val: &x, y_val: &y },
                |&value| Constant { value, fitted: false },
            )
            .unwrap();
        assert_eq!(result.best.params, 2.0);
    }

    #[test]
    fn test_invalid_searches() {
        let (x, y) = data();
        let empty: [f64; 0] = [];
        let validation = Validation::Holdout { x_train: &x, y_train: &y, x_val: &x, y_val: &y };
        assert!(GridSearch::new()
            .run(&empty, validation, |&value| Constant { value, fitted: false })
            .is_err());

        let folds = vec![Fold { train: 0..5, test: 15..25 }];
        assert!(GridSearch::new()
            .run(
                &[1.0],
                Validation::Folds { x: &x, y: &y, folds: &folds },
                |&value| Constant { value, fitted: false },
            )
            .is_err());
    }

    #[test]
    fn test_gbt_grid_candidates() {
        let grid = GbtGrid::default();
        let base = GradientBoostingConfig {
            early_stopping_rounds: Some(30),
            ..Default::default()
        };
        let candidates = grid.candidates(&base);
        assert_eq!(candidates.len(), 4);
        assert_eq!(candidates[0].max_depth, 3);
        assert_eq!(candidates[0].learning_rate, 0.09);
        assert_eq!(candidates[3].max_depth, 4);
        assert_eq!(candidates[3].learning_rate, 0.1);
        assert!(candidates.iter().all(|c| c.early_stopping_rounds == Some(30)));
    }
}
