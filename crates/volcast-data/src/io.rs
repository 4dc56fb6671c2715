//! CSV reading and writing for bucket tables and trades.

use crate::buckets::Trade;
use crate::error::{DataError, Result};
use crate::table::{
    HHMM_COL, TIME_COL, column_values, datetime_column, float_column, from_millis, hhmm_of,
    is_numeric, timestamps, to_millis,
};
use chrono::NaiveDateTime;
use polars::prelude::*;
use serde::Deserialize;
use std::path::Path;

/// Timestamp format used in every CSV file.
pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Parse a timestamp in [`TIME_FORMAT`] (an ISO `T` separator is accepted too).
pub fn parse_time(raw: &str) -> Result<NaiveDateTime> {
    let raw = raw.trim();
    NaiveDateTime::parse_from_str(raw, TIME_FORMAT)
        .or_else(|_| NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S"))
        .map_err(|e| DataError::Parse(format!("Invalid timestamp '{raw}': {e}")))
}

/// Read a table CSV with a `time` column and numeric value columns.
///
/// `hhmm` is read as an integer column, or derived from `time` when the file
/// does not carry it. Empty cells become nulls. Output columns are `time`,
/// `hhmm`, then the remaining columns in file order. Rows must be strictly
/// increasing in time.
pub fn read_table_csv<P: AsRef<Path>>(path: P) -> Result<DataFrame> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    let headers: Vec<String> = reader.headers()?.iter().map(str::to_string).collect();

    let time_idx = headers
        .iter()
        .position(|h| h == TIME_COL)
        .ok_or_else(|| DataError::MissingColumn(TIME_COL.to_string()))?;
    let hhmm_idx = headers.iter().position(|h| h == HHMM_COL);

    let mut times = Vec::new();
    let mut hhmm = Vec::new();
    let mut values: Vec<Vec<Option<f64>>> = vec![Vec::new(); headers.len()];

    for (line, record) in reader.records().enumerate() {
        let record = record?;
        let time = parse_time(record.get(time_idx).unwrap_or_default())?;
        let millis = to_millis(time);
        if let Some(&previous) = times.last() {
            if millis <= previous {
                return Err(DataError::Parse(format!(
                    "time must be strictly increasing: {} on line {} does not follow the previous row",
                    time.format(TIME_FORMAT),
                    line + 2
                )));
            }
        }
        times.push(millis);

        let bucket = match hhmm_idx.and_then(|i| record.get(i)) {
            Some(raw) => raw.trim().parse::<i32>().map_err(|e| {
                DataError::Parse(format!("Invalid hhmm '{raw}' on line {}: {e}", line + 2))
            })?,
            None => hhmm_of(time),
        };
        hhmm.push(bucket);

        for (i, raw) in record.iter().enumerate() {
            if i == time_idx || Some(i) == hhmm_idx {
                continue;
            }
            let raw = raw.trim();
            let value = if raw.is_empty() {
                None
            } else {
                Some(raw.parse::<f64>().map_err(|e| {
                    DataError::Parse(format!(
                        "Invalid value '{raw}' in column {} on line {}: {e}",
                        headers[i],
                        line + 2
                    ))
                })?)
            };
            values[i].push(value);
        }
    }

    let mut columns = vec![
        datetime_column(TIME_COL, times),
        Series::new(HHMM_COL.into(), hhmm).into(),
    ];
    for (i, name) in headers.iter().enumerate() {
        if i == time_idx || Some(i) == hhmm_idx {
            continue;
        }
        columns.push(float_column(name, std::mem::take(&mut values[i])));
    }

    Ok(DataFrame::new(columns)?)
}

/// Write a table to CSV. Nulls are written as empty cells.
pub fn write_table_csv<P: AsRef<Path>>(df: &DataFrame, path: P) -> Result<()> {
    let names: Vec<String> = df
        .get_column_names()
        .iter()
        .map(|name| name.to_string())
        .collect();

    let mut cells: Vec<Vec<String>> = Vec::with_capacity(names.len());
    for name in &names {
        let column = df.column(name)?;
        let rendered = match column.dtype() {
            DataType::Datetime(_, _) => timestamps(df, name)?
                .into_iter()
                .map(|v| match v {
                    Some(ms) => from_millis(ms).map(|t| t.format(TIME_FORMAT).to_string()),
                    None => Ok(String::new()),
                })
                .collect::<Result<Vec<_>>>()?,
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => column
                .cast(&DataType::Int64)?
                .i64()?
                .into_iter()
                .map(|v| v.map(|x| x.to_string()).unwrap_or_default())
                .collect(),
            dtype if is_numeric(dtype) => column_values(df, name)?
                .into_iter()
                .map(|v| v.map(|x| x.to_string()).unwrap_or_default())
                .collect(),
            dtype => {
                return Err(DataError::NonNumericColumn {
                    column: name.clone(),
                    dtype: dtype.to_string(),
                });
            }
        };
        cells.push(rendered);
    }

    let mut writer = csv::Writer::from_path(path.as_ref())?;
    writer.write_record(&names)?;
    for row in 0..df.height() {
        writer.write_record(cells.iter().map(|column| column[row].as_str()))?;
    }
    writer.flush()?;
    Ok(())
}

#[derive(Debug, Deserialize)]
struct TradeRecord {
    time: String,
    size: f64,
}

/// Read a trades CSV with `time` and `size` columns.
pub fn read_trades_csv<P: AsRef<Path>>(path: P) -> Result<Vec<Trade>> {
    let mut reader = csv::Reader::from_path(path.as_ref())?;
    reader
        .deserialize::<TradeRecord>()
        .map(|record| {
            let record = record?;
            Ok(Trade::new(parse_time(&record.time)?, record.size))
        })
        .collect()
}
