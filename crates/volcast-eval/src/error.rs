//! Error types for evaluation.

use thiserror::Error;

/// Result type for evaluation operations.
pub type Result<T> = std::result::Result<T, EvalError>;

/// Errors that can occur while evaluating or exporting results.
#[derive(Debug, Error)]
pub enum EvalError {
    /// Invalid evaluator configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// No observations left to score
    #[error("No observations to evaluate: {0}")]
    Empty(String),

    /// Prediction and truth have different lengths
    #[error("Length mismatch: {truth} true values, {predicted} predictions")]
    LengthMismatch {
        /// Number of true values
        truth: usize,
        /// Number of predictions
        predicted: usize,
    },

    /// Table access error
    #[error(transparent)]
    Data(#[from] volcast_data::DataError),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// CSV serialization error
    #[error("CSV serialization error: {0}")]
    Csv(#[from] csv::Error),

    /// JSON serialization error
    #[error("JSON serialization error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
