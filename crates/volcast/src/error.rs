//! Error types for the pipeline.

use thiserror::Error;

/// Result type for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that can occur while configuring or running the pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// Invalid pipeline configuration
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// A stage left nothing to work with
    #[error("Insufficient data: {0}")]
    InsufficientData(String),

    /// Data error
    #[error(transparent)]
    Data(#[from] volcast_data::DataError),

    /// Feature engineering error
    #[error(transparent)]
    Feature(#[from] volcast_features::FeatureError),

    /// Model error
    #[error(transparent)]
    Model(#[from] volcast_models::ModelError),

    /// Evaluation error
    #[error(transparent)]
    Eval(#[from] volcast_eval::EvalError),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::error::PolarsError),

    /// JSON error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
