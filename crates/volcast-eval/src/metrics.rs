//! Regression metrics.
//!
//! All functions take paired slices of equal, non-zero length. Callers drop
//! missing observations first (see [`paired`]).

use crate::error::{EvalError, Result};
use serde::{Deserialize, Serialize};

fn check(y_true: &[f64], y_pred: &[f64]) -> Result<()> {
    if y_true.len() != y_pred.len() {
        return Err(EvalError::LengthMismatch {
            truth: y_true.len(),
            predicted: y_pred.len(),
        });
    }
    if y_true.is_empty() {
        return Err(EvalError::Empty("metric input is empty".to_string()));
    }
    Ok(())
}

/// Mean absolute error.
pub fn mean_absolute_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check(y_true, y_pred)?;
    let total: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| (t - p).abs())
        .sum();
    Ok(total / y_true.len() as f64)
}

/// Mean absolute percentage error, `mean(|y_true - y_pred| / |y_true|)`.
///
/// Returned as a fraction (0.1 means 10%). Any zero true value makes the
/// result `f64::INFINITY`; such rows are not silently excluded.
pub fn mean_absolute_percentage_error(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check(y_true, y_pred)?;
    if y_true.iter().any(|t| *t == 0.0) {
        return Ok(f64::INFINITY);
    }
    let total: f64 = y_true
        .iter()
        .zip(y_pred)
        .map(|(t, p)| ((t - p) / t).abs())
        .sum();
    Ok(total / y_true.len() as f64)
}

/// Coefficient of determination.
///
/// A constant truth scores 1.0 when predicted exactly and 0.0 otherwise.
pub fn r2_score(y_true: &[f64], y_pred: &[f64]) -> Result<f64> {
    check(y_true, y_pred)?;
    let mean = y_true.iter().sum::<f64>() / y_true.len() as f64;
    let ss_res: f64 = y_true.iter().zip(y_pred).map(|(t, p)| (t - p).powi(2)).sum();
    let ss_tot: f64 = y_true.iter().map(|t| (t - mean).powi(2)).sum();

    if ss_tot == 0.0 {
        return Ok(if ss_res == 0.0 { 1.0 } else { 0.0 });
    }
    Ok(1.0 - ss_res / ss_tot)
}

/// Keep only positions where both values are present and finite.
pub fn paired(y_true: &[Option<f64>], y_pred: &[Option<f64>]) -> Result<(Vec<f64>, Vec<f64>)> {
    if y_true.len() != y_pred.len() {
        return Err(EvalError::LengthMismatch {
            truth: y_true.len(),
            predicted: y_pred.len(),
        });
    }
    Ok(y_true
        .iter()
        .zip(y_pred)
        .filter_map(|pair| match pair {
            (Some(t), Some(p)) if t.is_finite() && p.is_finite() => Some((*t, *p)),
            _ => None,
        })
        .unzip())
}

/// R², MAE and MAPE for one set of predictions.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Coefficient of determination
    pub r2: f64,
    /// Mean absolute error
    pub mae: f64,
    /// Mean absolute percentage error (fraction)
    pub mape: f64,
    /// Number of scored observations
    pub n: usize,
}

impl RegressionMetrics {
    /// Score predictions against truth.
    pub fn compute(y_true: &[f64], y_pred: &[f64]) -> Result<Self> {
        Ok(Self {
            r2: r2_score(y_true, y_pred)?,
            mae: mean_absolute_error(y_true, y_pred)?,
            mape: mean_absolute_percentage_error(y_true, y_pred)?,
            n: y_true.len(),
        })
    }

    /// Score optional pairs, dropping positions where either side is missing.
    pub fn compute_paired(y_true: &[Option<f64>], y_pred: &[Option<f64>]) -> Result<Self> {
        let (t, p) = paired(y_true, y_pred)?;
        let dropped = y_true.len() - t.len();
        if dropped > 0 {
            tracing::debug!(dropped, kept = t.len(), "excluded incomplete observations");
        }
        Self::compute(&t, &p)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use rstest::rstest;

    #[test]
    fn test_mape_definition() {
        let mape = mean_absolute_percentage_error(&[10.0, 20.0], &[11.0, 18.0]).unwrap();
        assert_relative_eq!(mape, 0.1, epsilon = 1e-12);
    }

    #[test]
    fn test_mape_zero_truth_is_infinite() {
        let mape = mean_absolute_percentage_error(&[0.0, 20.0], &[1.0, 18.0]).unwrap();
        assert!(mape.is_infinite());
    }

    #[rstest]
    #[case(&[1.0, 2.0, 3.0], &[1.0, 2.0, 3.0], 1.0)]
    #[case(&[1.0, 2.0, 3.0], &[2.0, 2.0, 2.0], 0.0)]
    #[case(&[5.0, 5.0], &[5.0, 5.0], 1.0)]
    #[case(&[5.0, 5.0], &[4.0, 6.0], 0.0)]
    fn test_r2_score(#[case] t: &[f64], #[case] p: &[f64], #[case] expected: f64) {
        assert_relative_eq!(r2_score(t, p).unwrap(), expected, epsilon = 1e-12);
    }

    #[test]
    fn test_mae() {
        let mae = mean_absolute_error(&[1.0, 2.0, 4.0], &[2.0, 2.0, 1.0]).unwrap();
        assert_relative_eq!(mae, 4.0 / 3.0, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(matches!(
            mean_absolute_error(&[], &[]),
            Err(EvalError::Empty(_))
        ));
        assert!(matches!(
            r2_score(&[1.0], &[1.0, 2.0]),
            Err(EvalError::LengthMismatch { truth: 1, predicted: 2 })
        ));
    }

    #[test]
    fn test_compute_paired_drops_missing() {
        let metrics = RegressionMetrics::compute_paired(
            &[Some(10.0), None, Some(20.0), Some(5.0)],
            &[Some(11.0), Some(3.0), Some(18.0), Some(f64::NAN)],
        )
        .unwrap();
        assert_eq!(metrics.n, 2);
        assert_relative_eq!(metrics.mape, 0.1, epsilon = 1e-12);
        assert_relative_eq!(metrics.mae, 1.5, epsilon = 1e-12);
    }
}
