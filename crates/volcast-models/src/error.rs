//! Error types for model fitting and prediction.

use thiserror::Error;

/// Result type for model operations.
pub type Result<T> = std::result::Result<T, ModelError>;

/// Errors that can occur while configuring, fitting or using a model.
#[derive(Debug, Error)]
pub enum ModelError {
    /// Prediction or attribution requested before fitting
    #[error("Model is not fitted")]
    NotFitted,

    /// Input dimensions do not match
    #[error("Shape mismatch: expected {expected}, got {actual}")]
    Shape {
        /// Expected shape
        expected: String,
        /// Observed shape
        actual: String,
    },

    /// Input data cannot be used
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// Invalid model configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Option key that no model recognizes
    #[error("Unknown option: {0}")]
    UnknownOption(String),

    /// Metric computation failed
    #[error(transparent)]
    Eval(#[from] volcast_eval::EvalError),

    /// Matrix shape error
    #[error("Shape error: {0}")]
    Ndarray(#[from] ndarray::ShapeError),
}
