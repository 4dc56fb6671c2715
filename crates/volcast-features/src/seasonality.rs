//! Intraday seasonality removal and restoration.
//!
//! The seasonal baseline of a row is the mean of the previous `window_days`
//! values of the same time-of-day bucket: a full-window rolling mean within
//! the bucket, shifted by one occurrence. The first `bins * window_days`
//! rows never get a baseline.

use crate::error::{FeatureError, Result};
use crate::transform::Transform;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use volcast_data::table::require_columns;

const WARM_COL: &str = "__warm";

/// Configuration shared by [`SeasonalityRemover`] and [`SeasonalityRestorer`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SeasonalityConfig {
    /// Columns to de-seasonalize
    pub columns: Vec<String>,
    /// Volume column whose baseline is applied to the target (default: `VOLUME_fut`)
    pub base_col: String,
    /// Time-of-day bucket column (default: `hhmm`)
    pub hhmm_col: String,
    /// Buckets per session (default: 39)
    pub bins: usize,
    /// Bucket occurrences in the rolling window (default: 20)
    pub window_days: usize,
}

impl Default for SeasonalityConfig {
    fn default() -> Self {
        Self {
            columns: Vec::new(),
            base_col: "VOLUME_fut".to_string(),
            hhmm_col: "hhmm".to_string(),
            bins: 39,
            window_days: 20,
        }
    }
}

impl SeasonalityConfig {
    /// Configuration de-seasonalizing `columns` with every other option at
    /// its default.
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            ..Default::default()
        }
    }

    /// `{base_col}_target`
    pub fn target_col(&self) -> String {
        format!("{}_target", self.base_col)
    }

    /// `{base_col}_agg`, the retained baseline.
    pub fn agg_col(&self) -> String {
        format!("{}_agg", self.base_col)
    }

    /// `{base_col}_pred`, the prediction column read by the restorer.
    pub fn pred_col(&self) -> String {
        format!("{}_pred", self.base_col)
    }

    /// Rows at positions below this never get a baseline.
    pub const fn warmup_rows(&self) -> usize {
        self.bins * self.window_days
    }

    /// Check sizes and column roles.
    pub fn validate(&self) -> Result<()> {
        if self.bins == 0 {
            return Err(FeatureError::Config("bins must be positive".to_string()));
        }
        if self.window_days == 0 {
            return Err(FeatureError::Config(
                "window_days must be positive".to_string(),
            ));
        }
        if self.columns.contains(&self.hhmm_col) {
            return Err(FeatureError::Config(format!(
                "bucket column `{}` cannot be de-seasonalized",
                self.hhmm_col
            )));
        }
        Ok(())
    }
}

/// Subtracts the per-bucket rolling baseline.
#[derive(Debug, Clone)]
pub struct SeasonalityRemover {
    config: SeasonalityConfig,
}

impl SeasonalityRemover {
    /// Create a remover, validating the configuration.
    pub fn new(config: SeasonalityConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the configuration.
    pub const fn config(&self) -> &SeasonalityConfig {
        &self.config
    }

    fn baseline(&self, column: &str) -> Expr {
        let window = RollingOptionsFixedWindow {
            window_size: self.config.window_days,
            min_periods: self.config.window_days,
            ..Default::default()
        };
        let rolling = col(column)
            .cast(DataType::Float64)
            .rolling_mean(window)
            .shift(lit(1))
            .over([col(self.config.hhmm_col.as_str())]);
        when(col(WARM_COL))
            .then(rolling)
            .otherwise(lit(NULL).cast(DataType::Float64))
    }
}

impl Transform for SeasonalityRemover {
    fn name(&self) -> &str {
        "seasonality_remover"
    }

    fn required_columns(&self) -> Vec<String> {
        let mut columns = self.config.columns.clone();
        columns.push(self.config.base_col.clone());
        columns.push(self.config.target_col());
        columns.push(self.config.hhmm_col.clone());
        columns
    }

    /// De-seasonalized table: input columns in input order followed by
    /// `{base_col}_agg`.
    ///
    /// Listed columns become `value - baseline(value)`, the target becomes
    /// `target - baseline(base_col)` and other columns pass through.
    fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        self.check_input(df)?;
        let target = self.config.target_col();
        let warmup = self.config.warmup_rows();

        let warm: Vec<bool> = (0..df.height()).map(|i| i >= warmup).collect();
        let mut input = df.clone();
        input.with_column(Series::new(WARM_COL.into(), warm))?;

        let base_agg = self.baseline(&self.config.base_col);
        let outputs: Vec<Expr> = df
            .get_column_names()
            .into_iter()
            .map(|name| {
                let name = name.as_str();
                if name == target {
                    (col(name).cast(DataType::Float64) - base_agg.clone()).alias(name)
                } else if self.config.columns.iter().any(|c| c == name) {
                    (col(name).cast(DataType::Float64) - self.baseline(name)).alias(name)
                } else {
                    col(name)
                }
            })
            .chain(std::iter::once(base_agg.clone().alias(self.config.agg_col())))
            .collect();

        let out = input.lazy().select(outputs).collect()?;
        tracing::debug!(
            rows = out.height(),
            warmup = warmup.min(out.height()),
            columns = self.config.columns.len(),
            "seasonality removed"
        );
        Ok(out)
    }
}

/// Adds the retained baseline back to predictions and targets.
#[derive(Debug, Clone)]
pub struct SeasonalityRestorer {
    base_col: String,
}

impl Default for SeasonalityRestorer {
    fn default() -> Self {
        Self::new(SeasonalityConfig::default().base_col)
    }
}

impl SeasonalityRestorer {
    /// Restorer for `{base_col}_pred`, `{base_col}_target` and `{base_col}_agg`.
    pub fn new(base_col: impl Into<String>) -> Self {
        Self {
            base_col: base_col.into(),
        }
    }

    /// Restorer matching a remover configuration.
    pub fn for_config(config: &SeasonalityConfig) -> Self {
        Self::new(config.base_col.clone())
    }

    fn columns(&self) -> [String; 3] {
        [
            format!("{}_pred", self.base_col),
            format!("{}_target", self.base_col),
            format!("{}_agg", self.base_col),
        ]
    }
}

impl Transform for SeasonalityRestorer {
    fn name(&self) -> &str {
        "seasonality_restorer"
    }

    fn required_columns(&self) -> Vec<String> {
        self.columns().to_vec()
    }

    /// Two columns, `{base_col}_pred` and `{base_col}_target`, with the
    /// baseline added back. Rows missing any of the three inputs are dropped.
    fn apply(&self, df: &DataFrame) -> Result<DataFrame> {
        let [pred, target, agg] = self.columns();
        require_columns(df, &[&pred, &target, &agg])?;

        let restored = |name: &str| {
            (col(name).cast(DataType::Float64) + col(agg.as_str()).cast(DataType::Float64))
                .alias(name)
        };
        let out = df
            .clone()
            .lazy()
            .select([restored(&pred), restored(&target)])
            .filter(col(pred.as_str()).is_not_null().and(col(target.as_str()).is_not_null()))
            .collect()?;

        let dropped = df.height() - out.height();
        if dropped > 0 {
            tracing::debug!(dropped, "rows without baseline dropped on restore");
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use volcast_data::table::{column_values, float_column};

    fn pattern(days: usize) -> DataFrame {
        let shape = [10.0, 20.0, 30.0];
        let n = days * shape.len();
        DataFrame::new(vec![
            Series::new("hhmm".into(), (0..n).map(|i| [940i32, 950, 1000][i % 3]).collect::<Vec<_>>()).into(),
            float_column("VOLUME_fut", (0..n).map(|i| Some(shape[i % 3])).collect()),
            float_column("VOLUME_fut_target", (0..n).map(|i| Some(shape[i % 3])).collect()),
            float_column("VOLUME_etf", (0..n).map(|i| Some(2.0 * shape[i % 3])).collect()),
        ])
        .unwrap()
    }

    fn remover(columns: &[&str]) -> SeasonalityRemover {
        SeasonalityRemover::new(SeasonalityConfig {
            bins: 3,
            window_days: 2,
            ..SeasonalityConfig::new(columns.iter().copied())
        })
        .unwrap()
    }

    #[test]
    fn test_constant_pattern_vanishes_after_warmup() {
        let out = remover(&["VOLUME_fut", "VOLUME_etf"]).apply(&pattern(4)).unwrap();
        let target = column_values(&out, "VOLUME_fut_target").unwrap();
        let etf = column_values(&out, "VOLUME_etf").unwrap();
        let agg = column_values(&out, "VOLUME_fut_agg").unwrap();

        for i in 0..6 {
            assert!(target[i].is_none(), "row {i} should be in warm-up");
            assert!(agg[i].is_none());
        }
        for i in 6..12 {
            assert_relative_eq!(target[i].unwrap(), 0.0, epsilon = 1e-12);
            assert_relative_eq!(etf[i].unwrap(), 0.0, epsilon = 1e-12);
            assert_relative_eq!(agg[i].unwrap(), [10.0, 20.0, 30.0][i % 3], epsilon = 1e-12);
        }
    }

    #[test]
    fn test_output_column_order() {
        let out = remover(&["VOLUME_etf"]).apply(&pattern(3)).unwrap();
        let names: Vec<&str> = out.get_column_names().into_iter().map(|n| n.as_str()).collect();
        assert_eq!(
            names,
            vec!["hhmm", "VOLUME_fut", "VOLUME_fut_target", "VOLUME_etf", "VOLUME_fut_agg"]
        );
        // Unlisted base column passes through
        assert_eq!(column_values(&out, "VOLUME_fut").unwrap()[7], Some(20.0));
    }

    #[test]
    fn test_baseline_excludes_current_row() {
        let mut df = pattern(4);
        // Spike at the last 09:40 bucket must not leak into its own baseline
        let mut target: Vec<Option<f64>> = column_values(&df, "VOLUME_fut").unwrap();
        target[9] = Some(1000.0);
        df.with_column(float_column("VOLUME_fut", target)).unwrap();

        let out = remover(&[]).apply(&df).unwrap();
        let agg = column_values(&out, "VOLUME_fut_agg").unwrap();
        assert_relative_eq!(agg[9].unwrap(), 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_restore_round_trip() {
        let df = pattern(4);
        let removed = remover(&[]).apply(&df).unwrap();
        let mut with_pred = removed.clone();
        with_pred
            .with_column(removed.column("VOLUME_fut_target").unwrap().clone().with_name("VOLUME_fut_pred".into()))
            .unwrap();

        let restored = SeasonalityRestorer::default().apply(&with_pred).unwrap();
        assert_eq!(restored.width(), 2);
        assert_eq!(restored.height(), 6);
        let pred = column_values(&restored, "VOLUME_fut_pred").unwrap();
        let target = column_values(&restored, "VOLUME_fut_target").unwrap();
        for (i, (p, t)) in pred.iter().zip(&target).enumerate() {
            let original = [10.0, 20.0, 30.0][(i + 6) % 3];
            assert_relative_eq!(p.unwrap(), original, epsilon = 1e-12);
            assert_relative_eq!(t.unwrap(), original, epsilon = 1e-12);
        }
    }

    #[test]
    fn test_config_errors() {
        assert!(SeasonalityRemover::new(SeasonalityConfig {
            bins: 0,
            ..Default::default()
        })
        .is_err());
        assert!(SeasonalityRemover::new(SeasonalityConfig::new(["hhmm"])).is_err());

        let df = pattern(1).drop("VOLUME_fut_target").unwrap();
        assert!(matches!(
            remover(&[]).apply(&df),
            Err(FeatureError::Data(volcast_data::DataError::MissingColumn(_)))
        ));
    }
}
