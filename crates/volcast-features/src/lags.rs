//! Lagged copies of columns.
//!
//! `{column}_lag_{k}` holds the value `k` rows earlier. Rows without `k`
//! prior rows are null. Dropping incomplete rows is a separate step,
//! [`drop_incomplete_rows`], which also remaps partition positions.

use crate::error::{FeatureError, Result};
use crate::transform::Transform;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use volcast_data::table::{column_values, take_rows};

/// Lag offsets used when none are configured: one to four buckets back, one
/// session back (38, 39), two sessions back (78) and five sessions back (195).
pub const DEFAULT_LAGS: [usize; 8] = [1, 2, 3, 4, 38, 39, 78, 195];

/// Name of the lag column for `column` at `lag`.
pub fn lag_name(column: &str, lag: usize) -> String {
    format!("{column}_lag_{lag}")
}

/// Configuration for [`LagFeatureBuilder`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LagConfig {
    /// Columns to lag
    pub columns: Vec<String>,
    /// Row offsets (default: [`DEFAULT_LAGS`])
    pub lags: Vec<usize>,
}

impl Default for LagConfig {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            lags: DEFAULT_LAGS.to_vec(),
        }
    }
}

impl LagConfig {
    /// Lag `columns` at the default offsets.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// Replace the offsets.
    pub fn with_lags(mut self, lags: &[usize]) -> Self {
        self.lags = lags.to_vec();
        self
    }

    /// At least one column and one positive offset.
    pub fn validate(&self) -> Result<()> {
        if self.columns.is_empty() {
            return Err(FeatureError::Config("no columns to lag".to_string()));
        }
        if self.lags.is_empty() {
            return Err(FeatureError::Config("no lag offsets".to_string()));
        }
        if self.lags.contains(&0) {
            return Err(FeatureError::Config("lag offsets must be positive".to_string()));
        }
        Ok(())
    }
}

/// Appends lag columns to a table.
#[derive(Debug, Clone)]
pub struct LagFeatureBuilder {
    config: LagConfig,
}

impl LagFeatureBuilder {
    /// Create a builder, validating the configuration.
    pub fn new(config: LagConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the configuration.
    pub const fn config(&self) -> &LagConfig {
        &self.config
    }

    /// Generated column names: every lag of the first column, then the next.
    pub fn feature_names(&self) -> Vec<String> {
        self.config
            .columns
            .iter()
            .flat_map(|column| self.config.lags.iter().map(move |&lag| lag_name(column, lag)))
            .collect()
    }

    /// The augmented table and the generated column names.
    pub fn build(&self, df: &DataFrame) -> Result<(DataFrame, Vec<String>)> {
        self.check_input(df)?;
        let exprs: Vec<Expr> = self
            .config
            .columns
            .iter()
            .flat_map(|column| {
                self.config.lags.iter().map(move |&lag| {
                    col(column.as_str())
                        .shift(lit(lag as i64))
                        .alias(lag_name(column, lag))
                })
            })
            .collect();

        let out = df.clone().lazy().with_columns(exprs).collect()?;
        let names = self.feature_names();
        tracing::debug!(features = names.len(), rows = out.height(), "lag features built");
        Ok((out, names))
    }
}

impl Transform for LagFeatureBuilder {
    fn name(&self) -> &str {
        "lag_features"
    }

    fn required_columns(&self) -> Vec<String> {
        self.config.columns.clone()
    }

    fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        self.build(df).map(|(out, _)| out)
    }
}

/// Rows kept by [`drop_incomplete_rows`], as positions in the input table.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct RowSelection {
    kept: Vec<usize>,
}

impl RowSelection {
    /// Kept input positions, ascending.
    pub fn kept(&self) -> &[usize] {
        &self.kept
    }

    /// Number of kept rows.
    pub fn len(&self) -> usize {
        self.kept.len()
    }

    /// Whether every row was dropped.
    pub fn is_empty(&self) -> bool {
        self.kept.is_empty()
    }

    /// Map input positions to positions in the filtered table, skipping
    /// dropped rows and keeping the given order.
    pub fn remap(&self, positions: &[usize]) -> Vec<usize> {
        positions
            .iter()
            .filter_map(|p| self.kept.binary_search(p).ok())
            .collect()
    }
}

/// Drop rows with a missing value in any of `columns`.
///
/// Returns the filtered table and the selection needed to remap partition
/// positions onto it.
pub fn drop_incomplete_rows<S: AsRef<str>>(
    df: &DataFrame,
    columns: &[S],
) -> Result<(DataFrame, RowSelection)> {
    let values = columns
        .iter()
        .map(|c| column_values(df, c.as_ref()))
        .collect::<volcast_data::Result<Vec<_>>>()?;

    let kept: Vec<usize> = (0..df.height())
        .filter(|&row| values.iter().all(|column| column[row].is_some()))
        .collect();
    let out = take_rows(df, &kept)?;
    tracing::debug!(kept = kept.len(), dropped = df.height() - kept.len(), "incomplete rows dropped");
    Ok((out, RowSelection { kept }))
}
