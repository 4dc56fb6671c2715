//! Attribution-based feature selection.
//!
//! A tree model is fitted on the training rows, per-row attributions are
//! summed in absolute value per feature and normalized, and the smallest
//! prefix of the descending ranking whose cumulative share exceeds the
//! threshold is kept.

use crate::error::{FeatureError, Result};
use polars::prelude::DataFrame;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use volcast_data::table::feature_matrix;
use volcast_models::{GradientBoostedTrees, Regressor, TreeAttribution};

const PLOT_WIDTH: usize = 40;

/// Configuration for [`FeatureSelector`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SelectionConfig {
    /// Cumulative importance to exceed (default: 0.95)
    pub threshold: f64,
    /// Log a text chart of the cumulative importance (default: false)
    pub plot: bool,
}

impl Default for SelectionConfig {
    fn default() -> Self {
        Self {
            threshold: 0.95,
            plot: false,
        }
    }
}

impl SelectionConfig {
    /// `threshold` must lie in [0, 1].
    pub fn validate(&self) -> Result<()> {
        if !(0.0..=1.0).contains(&self.threshold) {
            return Err(FeatureError::Config(format!(
                "threshold must be in [0, 1], got {}",
                self.threshold
            )));
        }
        Ok(())
    }
}

/// Ranking and selection produced by [`FeatureSelector`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureImportance {
    /// Features with normalized importance, descending
    pub ranking: Vec<(String, f64)>,
    /// Selected features in ranking order
    pub selected: Vec<String>,
    /// Threshold the selection was made against
    pub threshold: f64,
}

impl FeatureImportance {
    /// Rank features by score and select against `threshold`.
    ///
    /// Scores are normalized to sum to 1 and sorted descending; equal scores
    /// keep their input order. The selection is the prefix up to and
    /// including the first feature whose cumulative share exceeds
    /// `threshold`, or every feature if none does. When all scores are zero
    /// every feature is selected.
    pub fn from_scores(names: &[String], scores: &[f64], threshold: f64) -> Result<Self> {
        if names.len() != scores.len() {
            return Err(FeatureError::Config(format!(
                "{} feature names for {} scores",
                names.len(),
                scores.len()
            )));
        }
        if let Some(s) = scores.iter().find(|s| !(s.is_finite() && **s >= 0.0)) {
            return Err(FeatureError::Config(format!(
                "importance scores must be finite and non-negative, got {s}"
            )));
        }

        let total: f64 = scores.iter().sum();
        let mut ranking: Vec<(String, f64)> = names
            .iter()
            .cloned()
            .zip(scores.iter().map(|s| if total > 0.0 { s / total } else { 0.0 }))
            .collect();
        ranking.sort_by(|a, b| b.1.total_cmp(&a.1));

        let selected = if total > 0.0 {
            let mut cumulative = 0.0;
            let cut = ranking
                .iter()
                .position(|(_, share)| {
                    cumulative += share;
                    cumulative > threshold
                })
                .map_or(ranking.len(), |i| i + 1);
            ranking[..cut].iter().map(|(name, _)| name.clone()).collect()
        } else {
            tracing::warn!(features = names.len(), "all attributions are zero, keeping every feature");
            names.to_vec()
        };

        Ok(Self {
            ranking,
            selected,
            threshold,
        })
    }

    /// Cumulative normalized importance along the ranking.
    pub fn cumulative(&self) -> Vec<f64> {
        self.ranking
            .iter()
            .scan(0.0, |acc, (_, share)| {
                *acc += share;
                Some(*acc)
            })
            .collect()
    }

    /// Text chart of the cumulative importance curve with the cut marked.
    pub fn plot(&self) -> String {
        let width = self.ranking.iter().map(|(n, _)| n.len()).max().unwrap_or(0);
        let mut out = String::new();
        let _ = writeln!(out, "cumulative importance (threshold {:.2})", self.threshold);
        for (i, ((name, _), cum)) in self.ranking.iter().zip(self.cumulative()).enumerate() {
            let filled = (cum.clamp(0.0, 1.0) * PLOT_WIDTH as f64).round() as usize;
            let marker = if i + 1 == self.selected.len() { " <" } else { "" };
            let _ = writeln!(
                out,
                "{:>3} {name:<width$} {cum:>6.3} |{}{}|{marker}",
                i + 1,
                "#".repeat(filled),
                " ".repeat(PLOT_WIDTH - filled),
            );
        }
        out
    }
}

/// Selects features by tree attribution.
#[derive(Debug, Clone, Default)]
pub struct FeatureSelector {
    config: SelectionConfig,
}

impl FeatureSelector {
    /// Create a selector, validating the configuration.
    pub fn new(config: SelectionConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the configuration.
    pub const fn config(&self) -> &SelectionConfig {
        &self.config
    }

    /// Rank `features` with `model`.
    ///
    /// The model is fitted on the complete training rows unless it is
    /// already fitted; attributions are computed on the same rows.
    pub fn select<M>(
        &self,
        df: &DataFrame,
        train_rows: &[usize],
        features: &[String],
        target: &str,
        model: &mut M,
    ) -> Result<FeatureImportance>
    where
        M: Regressor + TreeAttribution + ?Sized,
    {
        if features.is_empty() {
            return Err(FeatureError::Config("no candidate features".to_string()));
        }
        let matrix = feature_matrix(df, train_rows, features, Some(target))?;
        if matrix.is_empty() {
            return Err(FeatureError::InsufficientData(
                "no complete training rows for feature selection".to_string(),
            ));
        }
        let skipped = train_rows.len() - matrix.len();
        if skipped > 0 {
            tracing::debug!(skipped, "incomplete training rows excluded from selection");
        }

        if !model.is_fitted() {
            let y = matrix.y.as_ref().ok_or_else(|| {
                FeatureError::InsufficientData("target values missing".to_string())
            })?;
            model.fit(&matrix.x, y)?;
        }

        let attributions = model.attributions(&matrix.x)?;
        let scores: Vec<f64> = attributions
            .columns()
            .into_iter()
            .map(|c| c.iter().map(|v| v.abs()).sum())
            .collect();

        let importance = FeatureImportance::from_scores(features, &scores, self.config.threshold)?;
        tracing::info!(
            model = model.name(),
            candidates = features.len(),
            selected = importance.selected.len(),
            threshold = self.config.threshold,
            "features selected"
        );
        if self.config.plot {
            tracing::info!("\n{}", importance.plot());
        }
        Ok(importance)
    }

    /// [`select`](Self::select) with a default gradient-boosted model.
    pub fn select_default(
        &self,
        df: &DataFrame,
        train_rows: &[usize],
        features: &[String],
        target: &str,
    ) -> Result<FeatureImportance> {
        tracing::warn!("no model supplied for feature selection, using default gradient boosting");
        let mut model = GradientBoostedTrees::default();
        self.select(df, train_rows, features, target, &mut model)
    }
}
