//! Error types for feature engineering.

use thiserror::Error;

/// Result type for feature operations.
pub type Result<T> = std::result::Result<T, FeatureError>;

/// Errors raised by transforms, splitters and the feature selector.
#[derive(Debug, Error)]
pub enum FeatureError {
    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Not enough rows or values to fit
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Table access failed
    #[error(transparent)]
    Data(#[from] volcast_data::DataError),

    /// Model fitting or attribution failed
    #[error(transparent)]
    Model(#[from] volcast_models::ModelError),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),
}
