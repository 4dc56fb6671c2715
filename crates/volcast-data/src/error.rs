//! Error types for data operations.

use thiserror::Error;

/// Result type for data operations.
pub type Result<T> = std::result::Result<T, DataError>;

/// Errors that can occur during data operations.
#[derive(Debug, Error)]
pub enum DataError {
    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Data parsing error
    #[error("Data parsing error: {0}")]
    Parse(String),

    /// Invalid time range
    #[error("Invalid time range: start {start} is after end {end}")]
    InvalidTimeRange {
        /// Start of the range
        start: String,
        /// End of the range
        end: String,
    },

    /// Missing data
    #[error("Missing data for {instrument}: {reason}")]
    MissingData {
        /// Instrument that was queried
        instrument: String,
        /// Reason for missing data
        reason: String,
    },

    /// A required column is absent from a table
    #[error("Missing column: {0}")]
    MissingColumn(String),

    /// A column has a type the operation cannot use
    #[error("Column {column} has non-numeric type {dtype}")]
    NonNumericColumn {
        /// Column name
        column: String,
        /// Observed data type
        dtype: String,
    },

    /// Row position outside the table
    #[error("Row position {position} out of bounds for table of height {height}")]
    RowOutOfBounds {
        /// Offending position
        position: usize,
        /// Table height
        height: usize,
    },

    /// Invalid configuration value
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Polars error
    #[error("Polars error: {0}")]
    Polars(#[from] polars::prelude::PolarsError),

    /// Matrix shape error
    #[error("Shape error: {0}")]
    Shape(#[from] ndarray::ShapeError),

    /// CSV error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Cache error
    #[error("Cache error: {0}")]
    Cache(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
