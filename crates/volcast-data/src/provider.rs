//! Time-series providers.
//!
//! A provider returns one instrument's bucketed volume table (`time`, `hhmm`,
//! `VOLUME`) for a time range. Where the data physically comes from is an
//! implementation detail of the provider.

use crate::error::{DataError, Result};
use crate::io::read_table_csv;
use crate::table::{HHMM_COL, TIME_COL, VOLUME_COL, require_columns, to_millis};
use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use std::path::PathBuf;

/// Instruments joined into the modelling table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Instrument {
    /// Index futures (the prediction target)
    Futures,
    /// Exchange-traded fund on the same index
    Etf,
    /// Options on the ETF
    Options,
}

impl Instrument {
    /// All instruments in join order.
    pub const ALL: [Self; 3] = [Self::Futures, Self::Etf, Self::Options];

    /// Column suffix used in the joined table.
    pub const fn suffix(&self) -> &'static str {
        match self {
            Self::Futures => "fut",
            Self::Etf => "etf",
            Self::Options => "opt",
        }
    }

    /// Volume column name in the joined table (e.g. `VOLUME_fut`).
    pub fn volume_column(&self) -> String {
        format!("{VOLUME_COL}_{}", self.suffix())
    }

    /// Parse from a suffix.
    pub fn from_suffix(s: &str) -> Result<Self> {
        match s {
            "fut" => Ok(Self::Futures),
            "etf" => Ok(Self::Etf),
            "opt" => Ok(Self::Options),
            _ => Err(DataError::Parse(format!("Unknown instrument: {s}"))),
        }
    }
}

impl fmt::Display for Instrument {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.suffix())
    }
}

/// A request for one instrument over a closed time range.
#[derive(Debug, Clone, PartialEq)]
pub struct LoadRequest {
    /// Instrument to load
    pub instrument: Instrument,
    /// First timestamp included
    pub start: NaiveDateTime,
    /// Last timestamp included
    pub end: NaiveDateTime,
}

impl LoadRequest {
    /// Create a request, rejecting inverted ranges.
    pub fn new(instrument: Instrument, start: NaiveDateTime, end: NaiveDateTime) -> Result<Self> {
        if start > end {
            return Err(DataError::InvalidTimeRange {
                start: start.to_string(),
                end: end.to_string(),
            });
        }
        Ok(Self {
            instrument,
            start,
            end,
        })
    }
}

/// Source of bucketed volume tables.
pub trait TimeSeriesProvider {
    /// Load `time`, `hhmm`, `VOLUME` for the request, sorted by time.
    fn load(&self, request: &LoadRequest) -> Result<DataFrame>;
}

/// Restrict a bucket table to the request range and sort it by time.
pub(crate) fn slice_range(df: DataFrame, request: &LoadRequest) -> Result<DataFrame> {
    require_columns(&df, &[TIME_COL, HHMM_COL, VOLUME_COL])?;
    let start = to_millis(request.start);
    let end = to_millis(request.end);

    let out = df
        .lazy()
        .with_column(col(TIME_COL).cast(DataType::Int64).alias("__ms"))
        .filter(col("__ms").gt_eq(lit(start)).and(col("__ms").lt_eq(lit(end))))
        .sort([TIME_COL], Default::default())
        .select([col(TIME_COL), col(HHMM_COL), col(VOLUME_COL)])
        .collect()?;

    if out.height() == 0 {
        return Err(DataError::MissingData {
            instrument: request.instrument.to_string(),
            reason: format!("No buckets between {} and {}", request.start, request.end),
        });
    }
    Ok(out)
}

/// Provider over tables already held in memory.
#[derive(Debug, Default, Clone)]
pub struct InMemoryProvider {
    tables: HashMap<Instrument, DataFrame>,
}

impl InMemoryProvider {
    /// Create an empty provider.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the table for an instrument.
    pub fn with_table(mut self, instrument: Instrument, table: DataFrame) -> Self {
        self.tables.insert(instrument, table);
        self
    }
}

impl TimeSeriesProvider for InMemoryProvider {
    fn load(&self, request: &LoadRequest) -> Result<DataFrame> {
        let table = self
            .tables
            .get(&request.instrument)
            .ok_or_else(|| DataError::MissingData {
                instrument: request.instrument.to_string(),
                reason: "No table registered".to_string(),
            })?;
        slice_range(table.clone(), request)
    }
}

/// Provider reading one bucket CSV per instrument.
#[derive(Debug, Default, Clone)]
pub struct CsvProvider {
    paths: HashMap<Instrument, PathBuf>,
}

impl CsvProvider {
    /// Create a provider with no files registered.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register the CSV file for an instrument.
    pub fn with_file(mut self, instrument: Instrument, path: impl Into<PathBuf>) -> Self {
        self.paths.insert(instrument, path.into());
        self
    }
}

impl TimeSeriesProvider for CsvProvider {
    fn load(&self, request: &LoadRequest) -> Result<DataFrame> {
        let path = self
            .paths
            .get(&request.instrument)
            .ok_or_else(|| DataError::MissingData {
                instrument: request.instrument.to_string(),
                reason: "No CSV file registered".to_string(),
            })?;
        tracing::debug!(instrument = %request.instrument, path = %path.display(), "reading bucket csv");
        slice_range(read_table_csv(path)?, request)
    }
}
