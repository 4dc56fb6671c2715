//! Positional partitions of a chronologically ordered table.

use crate::error::{FeatureError, Result};
use serde::{Deserialize, Serialize};
use std::ops::Range;
use volcast_models::Fold;

/// Train/validation/test fractions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SplitConfig {
    /// Fraction of rows in the test partition (default: 0.1)
    pub test_size: f64,
    /// Fraction of rows in the validation partition (default: 0.1)
    pub val_size: f64,
}

impl Default for SplitConfig {
    fn default() -> Self {
        Self {
            test_size: 0.1,
            val_size: 0.1,
        }
    }
}

impl SplitConfig {
    /// Both fractions in (0, 1) with a sum below 1.
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [("test_size", self.test_size), ("val_size", self.val_size)] {
            if !(value > 0.0 && value < 1.0) {
                return Err(FeatureError::Config(format!(
                    "{name} must be in (0, 1), got {value}"
                )));
            }
        }
        if self.test_size + self.val_size >= 1.0 {
            return Err(FeatureError::Config(format!(
                "test_size + val_size must be below 1, got {}",
                self.test_size + self.val_size
            )));
        }
        Ok(())
    }
}

/// Three contiguous, ordered partitions covering `0..len`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Split {
    /// Training rows
    pub train: Range<usize>,
    /// Validation rows
    pub validation: Range<usize>,
    /// Test rows
    pub test: Range<usize>,
}

impl Split {
    /// Training positions.
    pub fn train_rows(&self) -> Vec<usize> {
        self.train.clone().collect()
    }

    /// Validation positions.
    pub fn validation_rows(&self) -> Vec<usize> {
        self.validation.clone().collect()
    }

    /// Test positions.
    pub fn test_rows(&self) -> Vec<usize> {
        self.test.clone().collect()
    }

    /// Total number of rows.
    pub const fn len(&self) -> usize {
        self.test.end
    }

    /// Whether the split covers no rows.
    pub const fn is_empty(&self) -> bool {
        self.test.end == 0
    }
}

/// Splits a table of `n` rows by position.
#[derive(Debug, Clone, Default)]
pub struct TimeSeriesSplitter {
    config: SplitConfig,
}

impl TimeSeriesSplitter {
    /// Create a splitter, validating the fractions.
    pub fn new(config: SplitConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the configuration.
    pub const fn config(&self) -> &SplitConfig {
        &self.config
    }

    /// `test_len = floor(n * test_size)`, `val_len = floor(n * val_size)`,
    /// training takes the rest from the start.
    pub fn split(&self, n: usize) -> Result<Split> {
        let test_len = (n as f64 * self.config.test_size).floor() as usize;
        let val_len = (n as f64 * self.config.val_size).floor() as usize;
        let train_len = n.saturating_sub(test_len + val_len);
        if train_len == 0 {
            return Err(FeatureError::Config(format!(
                "{n} rows leave no training rows (test {test_len}, validation {val_len})"
            )));
        }

        let split = Split {
            train: 0..train_len,
            validation: train_len..train_len + val_len,
            test: train_len + val_len..n,
        };
        tracing::debug!(train = train_len, validation = val_len, test = n - train_len - val_len, "split");
        Ok(split)
    }
}

/// Expanding-window cross-validation folds.
///
/// Each test block holds `n / (n_splits + 1)` rows; the last block ends at the
/// final row and every training range starts at zero.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSeriesFolds {
    /// Number of folds (default: 10)
    pub n_splits: usize,
}

impl Default for TimeSeriesFolds {
    fn default() -> Self {
        Self { n_splits: 10 }
    }
}

impl TimeSeriesFolds {
    /// Create a fold generator.
    pub fn new(n_splits: usize) -> Result<Self> {
        if n_splits < 2 {
            return Err(FeatureError::Config(format!(
                "n_splits must be at least 2, got {n_splits}"
            )));
        }
        Ok(Self { n_splits })
    }

    /// Folds over `n` rows.
    pub fn folds(&self, n: usize) -> Result<Vec<Fold>> {
        if self.n_splits < 2 {
            return Err(FeatureError::Config(format!(
                "n_splits must be at least 2, got {}",
                self.n_splits
            )));
        }
        let fold_len = n / (self.n_splits + 1);
        if fold_len == 0 {
            return Err(FeatureError::InsufficientData(format!(
                "{n} rows cannot fill {} folds",
                self.n_splits
            )));
        }
        let first = n - self.n_splits * fold_len;
        Ok((0..self.n_splits)
            .map(|i| {
                let start = first + i * fold_len;
                Fold {
                    train: 0..start,
                    test: start..start + fold_len,
                }
            })
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case(100, 0.1, 0.1, 80, 10, 10)]
    #[case(105, 0.1, 0.25, 69, 26, 10)]
    #[case(7, 0.2, 0.2, 5, 1, 1)]
    fn test_split_lengths(
        #[case] n: usize,
        #[case] test_size: f64,
        #[case] val_size: f64,
        #[case] train: usize,
        #[case] validation: usize,
        #[case] test: usize,
    ) {
        let splitter = TimeSeriesSplitter::new(SplitConfig { test_size, val_size }).unwrap();
        let split = splitter.split(n).unwrap();
        assert_eq!(split.train.len(), train);
        assert_eq!(split.validation.len(), validation);
        assert_eq!(split.test.len(), test);
        assert_eq!(split.train.end, split.validation.start);
        assert_eq!(split.validation.end, split.test.start);
        assert_eq!(split.len(), n);
    }

    #[rstest]
    #[case(0.0, 0.1)]
    #[case(0.5, 0.5)]
    #[case(1.2, 0.1)]
    #[case(0.1, f64::NAN)]
    fn test_invalid_fractions(#[case] test_size: f64, #[case] val_size: f64) {
        assert!(matches!(
            TimeSeriesSplitter::new(SplitConfig { test_size, val_size }),
            Err(FeatureError::Config(_))
        ));
    }

    #[test]
    fn test_empty_table_has_no_training_rows() {
        let splitter = TimeSeriesSplitter::default();
        assert!(splitter.split(0).is_err());
    }

    #[test]
    fn test_folds_expand() {
        let folds = TimeSeriesFolds::new(3).unwrap().folds(10).unwrap();
        assert_eq!(folds.len(), 3);
        assert_eq!(folds[0], Fold { train: 0..4, test: 4..6 });
        assert_eq!(folds[1], Fold { train: 0..6, test: 6..8 });
        assert_eq!(folds[2], Fold { train: 0..8, test: 8..10 });
    }

    #[test]
    fn test_folds_need_rows() {
        assert!(TimeSeriesFolds::new(1).is_err());
        assert!(TimeSeriesFolds::new(4).unwrap().folds(3).is_err());
    }
}
