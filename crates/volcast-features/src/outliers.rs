//! Outlier capping with bounds fitted on the training partition.
//!
//! For each column: `upper = mean + std_num * std` and
//! `lower = max(0, mean - std_num * std)`, where the mean and the sample
//! standard deviation (ddof 1) come from non-missing training values only.
//! The bounds are then applied to every row.

use crate::error::{FeatureError, Result};
use crate::transform::Transform;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use volcast_data::table::{column_values, float_column};

/// Configuration for the outlier capper.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OutlierConfig {
    /// Columns to cap
    pub columns: Vec<String>,
    /// Width of the band in standard deviations (default: 4)
    pub std_num: f64,
}

impl Default for OutlierConfig {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            std_num: 4.0,
        }
    }
}

impl OutlierConfig {
    /// Configuration capping `columns` at the default width.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// `std_num` must be finite and non-negative.
    pub fn validate(&self) -> Result<()> {
        if !(self.std_num.is_finite() && self.std_num >= 0.0) {
            return Err(FeatureError::Config(format!(
                "std_num must be a non-negative number, got {}",
                self.std_num
            )));
        }
        Ok(())
    }
}

/// Clipping interval for one column.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    /// Lower bound, never negative
    pub lower: f64,
    /// Upper bound
    pub upper: f64,
}

impl Bounds {
    /// Clip a value into the interval.
    pub fn clip(&self, value: f64) -> f64 {
        if value > self.upper {
            self.upper
        } else if value < self.lower {
            self.lower
        } else {
            value
        }
    }
}

/// Fits per-column bounds on training rows.
#[derive(Debug, Clone, Default)]
pub struct OutlierCapper {
    config: OutlierConfig,
}

impl OutlierCapper {
    /// Create a capper, validating the configuration.
    pub fn new(config: OutlierConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the configuration.
    pub const fn config(&self) -> &OutlierConfig {
        &self.config
    }

    /// Compute bounds from `train_rows` only.
    ///
    /// Non-numeric columns are rejected. A column needs at least two
    /// non-missing training values.
    pub fn fit(&self, df: &DataFrame, train_rows: &[usize]) -> Result<FittedCaps> {
        let height = df.height();
        if let Some(&position) = train_rows.iter().find(|&&r| r >= height) {
            return Err(volcast_data::DataError::RowOutOfBounds { position, height }.into());
        }

        let mut bounds = Vec::with_capacity(self.config.columns.len());
        for column in &self.config.columns {
            let values = column_values(df, column)?;
            let train: Vec<f64> = train_rows.iter().filter_map(|&r| values[r]).collect();
            if train.len() < 2 {
                return Err(FeatureError::InsufficientData(format!(
                    "column `{column}` has {} training values, need at least 2",
                    train.len()
                )));
            }

            let n = train.len() as f64;
            let mean = train.iter().sum::<f64>() / n;
            let var = train.iter().map(|v| (v - mean).powi(2)).sum::<f64>() / (n - 1.0);
            let std = var.sqrt();
            let b = Bounds {
                lower: (mean - self.config.std_num * std).max(0.0),
                upper: mean + self.config.std_num * std,
            };
            tracing::debug!(column = column.as_str(), lower = b.lower, upper = b.upper, "outlier bounds");
            bounds.push((column.clone(), b));
        }

        Ok(FittedCaps { bounds })
    }
}

/// Bounds fitted by [`OutlierCapper::fit`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FittedCaps {
    bounds: Vec<(String, Bounds)>,
}

impl FittedCaps {
    /// Bounds of a column, if it was fitted.
    pub fn bounds(&self, column: &str) -> Option<Bounds> {
        self.bounds
            .iter()
            .find(|(name, _)| name == column)
            .map(|(_, b)| *b)
    }

    /// Every fitted column with its bounds.
    pub fn iter(&self) -> impl Iterator<Item = (&str, Bounds)> {
        self.bounds.iter().map(|(name, b)| (name.as_str(), *b))
    }
}

impl Transform for FittedCaps {
    fn name(&self) -> &str {
        "outlier_caps"
    }

    fn required_columns(&self) -> Vec<String> {
        self.bounds.iter().map(|(name, _)| name.clone()).collect()
    }

    /// Clip every row of each fitted column; capped columns become `Float64`
    /// and missing values stay missing.
    fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        self.check_input(df)?;
        let mut out = df.clone();
        for (column, bounds) in &self.bounds {
            let capped = column_values(df, column)?
                .into_iter()
                .map(|v| v.map(|x| bounds.clip(x)))
                .collect();
            out.with_column(float_column(column, capped))?;
        }
        Ok(out)
    }
}
