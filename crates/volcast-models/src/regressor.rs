//! Capability traits implemented by the models.

use crate::error::{ModelError, Result};
use ndarray::{Array1, Array2};

/// A model mapping feature rows to a continuous target.
pub trait Regressor {
    /// Short name used in logs and reports.
    fn name(&self) -> &str;

    /// Fit on `x` (rows x features) and `y`.
    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()>;

    /// Predict one value per row of `x`.
    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>>;

    /// Whether `fit` has completed.
    fn is_fitted(&self) -> bool;
}

/// Per-row, per-feature additive explanation of a model's predictions.
///
/// For every row, `expected_value() + attributions(x).row(i).sum()` equals
/// the model's prediction for that row.
pub trait TreeAttribution {
    /// Attributions with the same shape as `x`.
    fn attributions(&self, x: &Array2<f64>) -> Result<Array2<f64>>;

    /// Prediction before any feature is taken into account.
    fn expected_value(&self) -> Result<f64>;
}

/// Validate a training set: matching lengths, at least one row, finite values.
pub(crate) fn check_training_data(x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
    if x.nrows() != y.len() {
        return Err(ModelError::Shape {
            expected: format!("y length = {}", x.nrows()),
            actual: format!("y length = {}", y.len()),
        });
    }
    if x.nrows() == 0 {
        return Err(ModelError::InvalidInput("no training rows".to_string()));
    }
    if x.iter().chain(y.iter()).any(|v| !v.is_finite()) {
        return Err(ModelError::InvalidInput(
            "training data contains non-finite values".to_string(),
        ));
    }
    Ok(())
}

/// Validate the column count of a prediction input.
pub(crate) fn check_features(x: &Array2<f64>, n_features: usize) -> Result<()> {
    if x.ncols() != n_features {
        return Err(ModelError::Shape {
            expected: format!("{n_features} features"),
            actual: format!("{} features", x.ncols()),
        });
    }
    Ok(())
}
