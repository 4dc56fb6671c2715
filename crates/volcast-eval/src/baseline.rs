//! Persistence-forecast baseline.
//!
//! Two modes:
//!
//! - raw volumes: the prediction for a row is the target one occurrence
//!   earlier in the same time-of-day bucket (today's 09:40 from yesterday's
//!   09:40);
//! - de-seasonalized volumes: the prediction is the previous row's residual
//!   plus the row's seasonal baseline, and the truth is the residual plus the
//!   same baseline.

use crate::error::{EvalError, Result};
use crate::metrics::RegressionMetrics;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use volcast_data::table::{column_values, require_columns, take_rows};

/// Prediction column of [`BaselineEvaluator::predictions`].
pub const PREDICTION_COL: &str = "PREDICTION";

/// Truth column of [`BaselineEvaluator::predictions`].
pub const ORIGINAL_COL: &str = "ORIGINAL";

/// Configuration for the persistence baseline.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BaselineConfig {
    /// Target column (de-seasonalized when `remove_seasonality` is set)
    pub target_col: String,
    /// Retained seasonal baseline, required with `remove_seasonality`
    pub target_agg_col: Option<String>,
    /// Time-of-day bucket column, required without `remove_seasonality`
    pub hhmm_col: Option<String>,
    /// Whether the target was de-seasonalized
    pub remove_seasonality: bool,
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self {
            target_col: "VOLUME_fut_target".to_string(),
            target_agg_col: None,
            hhmm_col: Some("hhmm".to_string()),
            remove_seasonality: false,
        }
    }
}

impl BaselineConfig {
    /// Configuration for a de-seasonalized target with its baseline column.
    pub fn deseasonalized(target_col: impl Into<String>, target_agg_col: impl Into<String>) -> Self {
        Self {
            target_col: target_col.into(),
            target_agg_col: Some(target_agg_col.into()),
            hhmm_col: None,
            remove_seasonality: true,
        }
    }

    /// Configuration for a raw target aligned by bucket.
    pub fn bucketed(target_col: impl Into<String>, hhmm_col: impl Into<String>) -> Self {
        Self {
            target_col: target_col.into(),
            target_agg_col: None,
            hhmm_col: Some(hhmm_col.into()),
            remove_seasonality: false,
        }
    }

    /// Check that the column required by the selected mode is named.
    pub fn validate(&self) -> Result<()> {
        if self.remove_seasonality && self.target_agg_col.is_none() {
            return Err(EvalError::Config(
                "`target_agg_col` must be specified when `remove_seasonality` is true".to_string(),
            ));
        }
        if !self.remove_seasonality && self.hhmm_col.is_none() {
            return Err(EvalError::Config(
                "`hhmm_col` must be specified when `remove_seasonality` is false".to_string(),
            ));
        }
        Ok(())
    }
}

/// Scores the persistence forecast on a set of test rows.
#[derive(Debug, Clone)]
pub struct BaselineEvaluator {
    config: BaselineConfig,
}

impl BaselineEvaluator {
    /// Create an evaluator, validating the configuration.
    pub fn new(config: BaselineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the configuration.
    pub const fn config(&self) -> &BaselineConfig {
        &self.config
    }

    fn forecast_exprs(&self) -> Result<[Expr; 2]> {
        let target = col(self.config.target_col.as_str());
        let previous = target.clone().shift(lit(1));

        if self.config.remove_seasonality {
            let agg = self
                .config
                .target_agg_col
                .as_deref()
                .map(col)
                .ok_or_else(|| EvalError::Config("missing `target_agg_col`".to_string()))?;
            Ok([
                (previous + agg.clone()).alias(PREDICTION_COL),
                (target + agg).alias(ORIGINAL_COL),
            ])
        } else {
            let hhmm = self
                .config
                .hhmm_col
                .as_deref()
                .map(col)
                .ok_or_else(|| EvalError::Config("missing `hhmm_col`".to_string()))?;
            Ok([
                previous.over([hhmm]).alias(PREDICTION_COL),
                target.alias(ORIGINAL_COL),
            ])
        }
    }

    /// `PREDICTION` and `ORIGINAL` for the given rows, in row order.
    ///
    /// The forecast is computed over the whole table before the rows are
    /// taken, so the first test row can use history from earlier partitions.
    pub fn predictions(&self, df: &DataFrame, rows: &[usize]) -> Result<DataFrame> {
        let mut required = vec![self.config.target_col.as_str()];
        if self.config.remove_seasonality {
            required.extend(self.config.target_agg_col.as_deref());
        } else {
            required.extend(self.config.hhmm_col.as_deref());
        }
        require_columns(df, &required)?;

        let [prediction, original] = self.forecast_exprs()?;
        let forecast = df
            .clone()
            .lazy()
            .select([prediction, original])
            .collect()?;
        Ok(take_rows(&forecast, rows)?)
    }

    /// R², MAE and MAPE of the forecast over `rows`.
    ///
    /// Rows missing either the prediction or the truth are excluded.
    pub fn evaluate(&self, df: &DataFrame, rows: &[usize]) -> Result<RegressionMetrics> {
        let table = self.predictions(df, rows)?;
        let predicted = column_values(&table, PREDICTION_COL)?;
        let original = column_values(&table, ORIGINAL_COL)?;

        let missing = predicted
            .iter()
            .zip(&original)
            .filter(|(p, o)| p.is_none() || o.is_none())
            .count();
        if missing > 0 {
            tracing::info!(missing, total = rows.len(), "baseline rows without history excluded");
        }

        let metrics = RegressionMetrics::compute_paired(&original, &predicted)?;
        tracing::debug!(r2 = metrics.r2, mae = metrics.mae, mape = metrics.mape, "baseline scored");
        Ok(metrics)
    }
}
