//! Column helpers shared by the pipeline crates.
//!
//! Tables are plain polars `DataFrame`s ordered by `time`. Missing values are
//! nulls; NaN produced by arithmetic is read back as missing.

use crate::error::{DataError, Result};
use chrono::{DateTime, NaiveDateTime, Timelike};
use ndarray::{Array1, Array2};
use polars::prelude::*;

/// Timestamp column of every table.
pub const TIME_COL: &str = "time";

/// Time-of-day bucket column (`HHMM` as an integer, e.g. 940).
pub const HHMM_COL: &str = "hhmm";

/// Raw volume column returned by providers.
pub const VOLUME_COL: &str = "VOLUME";

/// Whether a column type can be read as `f64`.
pub const fn is_numeric(dtype: &DataType) -> bool {
    matches!(
        dtype,
        DataType::Float64
            | DataType::Float32
            | DataType::Int64
            | DataType::Int32
            | DataType::Int16
            | DataType::Int8
            | DataType::UInt64
            | DataType::UInt32
            | DataType::UInt16
            | DataType::UInt8
    )
}

/// Fail with [`DataError::MissingColumn`] for the first absent column.
pub fn require_columns<S: AsRef<str>>(df: &DataFrame, columns: &[S]) -> Result<()> {
    for name in columns {
        let name = name.as_ref();
        if df.get_column_index(name).is_none() {
            return Err(DataError::MissingColumn(name.to_string()));
        }
    }
    Ok(())
}

/// Read a numeric column as `f64`, nulls and NaN as `None`.
pub fn column_values(df: &DataFrame, name: &str) -> Result<Vec<Option<f64>>> {
    let column = df
        .column(name)
        .map_err(|_| DataError::MissingColumn(name.to_string()))?;

    if !is_numeric(column.dtype()) {
        return Err(DataError::NonNumericColumn {
            column: name.to_string(),
            dtype: column.dtype().to_string(),
        });
    }

    let values = column.cast(&DataType::Float64)?;
    Ok(values
        .f64()?
        .into_iter()
        .map(|v| v.filter(|x| !x.is_nan()))
        .collect())
}

/// Read a timestamp column as epoch milliseconds.
pub fn timestamps(df: &DataFrame, name: &str) -> Result<Vec<Option<i64>>> {
    let column = df
        .column(name)
        .map_err(|_| DataError::MissingColumn(name.to_string()))?;
    let physical = column.cast(&DataType::Int64)?;
    Ok(physical.i64()?.into_iter().collect())
}

/// Build a nullable `Float64` column.
pub fn float_column(name: &str, values: Vec<Option<f64>>) -> Column {
    Series::new(name.into(), values).into()
}

/// Build a millisecond `Datetime` column from epoch milliseconds.
pub fn datetime_column(name: &str, millis: Vec<i64>) -> Column {
    Int64Chunked::from_vec(name.into(), millis)
        .into_datetime(TimeUnit::Milliseconds, None)
        .into_series()
        .into()
}

/// Epoch milliseconds of a naive timestamp.
pub fn to_millis(time: NaiveDateTime) -> i64 {
    time.and_utc().timestamp_millis()
}

/// Naive timestamp from epoch milliseconds.
pub fn from_millis(millis: i64) -> Result<NaiveDateTime> {
    DateTime::from_timestamp_millis(millis)
        .map(|dt| dt.naive_utc())
        .ok_or_else(|| DataError::Parse(format!("Timestamp out of range: {millis}")))
}

/// `HHMM` bucket identifier of a timestamp (09:40 -> 940).
pub fn hhmm_of(time: NaiveDateTime) -> i32 {
    (time.hour() * 100 + time.minute()) as i32
}

/// Take rows by position, preserving the given order.
pub fn take_rows(df: &DataFrame, rows: &[usize]) -> Result<DataFrame> {
    let height = df.height();
    if let Some(&position) = rows.iter().find(|&&r| r >= height) {
        return Err(DataError::RowOutOfBounds { position, height });
    }
    let idx = IdxCa::from_vec(
        "rows".into(),
        rows.iter().map(|&r| r as IdxSize).collect(),
    );
    Ok(df.take(&idx)?)
}

/// Dense feature matrix extracted from a table.
#[derive(Debug, Clone)]
pub struct FeatureMatrix {
    /// Feature values (rows x features)
    pub x: Array2<f64>,
    /// Target values, when a target column was requested
    pub y: Option<Array1<f64>>,
    /// Table positions of the rows kept in `x`
    pub rows: Vec<usize>,
}

impl FeatureMatrix {
    /// Number of rows kept.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Whether no row survived.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

/// Gather `features` (and optionally `target`) at `rows` into a matrix.
///
/// Rows with any missing value among the requested columns are skipped; the
/// positions that were kept are reported in [`FeatureMatrix::rows`].
pub fn feature_matrix<S: AsRef<str>>(
    df: &DataFrame,
    rows: &[usize],
    features: &[S],
    target: Option<&str>,
) -> Result<FeatureMatrix> {
    let height = df.height();
    let columns = features
        .iter()
        .map(|name| column_values(df, name.as_ref()))
        .collect::<Result<Vec<_>>>()?;
    let target_values = target.map(|name| column_values(df, name)).transpose()?;

    let mut data = Vec::with_capacity(rows.len() * columns.len());
    let mut y = Vec::with_capacity(rows.len());
    let mut kept = Vec::with_capacity(rows.len());

    'rows: for &row in rows {
        if row >= height {
            return Err(DataError::RowOutOfBounds {
                position: row,
                height,
            });
        }
        let target_value = match &target_values {
            Some(values) => match values[row] {
                Some(v) => Some(v),
                None => continue 'rows,
            },
            None => None,
        };
        let mut values = Vec::with_capacity(columns.len());
        for column in &columns {
            match column[row] {
                Some(v) => values.push(v),
                None => continue 'rows,
            }
        }
        data.extend(values);
        if let Some(v) = target_value {
            y.push(v);
        }
        kept.push(row);
    }

    let x = Array2::from_shape_vec((kept.len(), columns.len()), data)?;
    Ok(FeatureMatrix {
        x,
        y: target.map(|_| Array1::from_vec(y)),
        rows: kept,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn sample() -> DataFrame {
        DataFrame::new(vec![
            float_column("a", vec![Some(1.0), None, Some(3.0), Some(4.0)]),
            float_column("b", vec![Some(10.0), Some(20.0), Some(f64::NAN), Some(40.0)]),
            Series::new("label".into(), vec!["w", "x", "y", "z"]).into(),
        ])
        .unwrap()
    }

    #[test]
    fn test_column_values_treats_nan_as_missing() {
        let df = sample();
        let b = column_values(&df, "b").unwrap();
        assert_eq!(b, vec![Some(10.0), Some(20.0), None, Some(40.0)]);
    }

    #[test]
    fn test_column_values_rejects_strings() {
        let df = sample();
        let err = column_values(&df, "label").unwrap_err();
        assert!(matches!(err, DataError::NonNumericColumn { .. }));
    }

    #[test]
    fn test_column_values_reads_narrow_integers() {
        let df = DataFrame::new(vec![
            Series::new("i8".into(), vec![1i8, -2, 3]).into(),
            Series::new("i16".into(), vec![100i16, 200, 300]).into(),
            Series::new("u8".into(), vec![1u8, 2, 3]).into(),
            Series::new("u16".into(), vec![940u16, 950, 1000]).into(),
        ])
        .unwrap();
        assert_eq!(column_values(&df, "i8").unwrap(), vec![Some(1.0), Some(-2.0), Some(3.0)]);
        assert_eq!(column_values(&df, "i16").unwrap()[2], Some(300.0));
        assert_eq!(column_values(&df, "u8").unwrap()[0], Some(1.0));
        assert_eq!(
            column_values(&df, "u16").unwrap(),
            vec![Some(940.0), Some(950.0), Some(1000.0)]
        );
    }

    #[test]
    fn test_require_columns() {
        let df = sample();
        assert!(require_columns(&df, &["a", "b"]).is_ok());
        let err = require_columns(&df, &["a", "missing"]).unwrap_err();
        assert!(matches!(err, DataError::MissingColumn(name) if name == "missing"));
    }

    #[test]
    fn test_feature_matrix_skips_incomplete_rows() {
        let df = sample();
        let m = feature_matrix(&df, &[0, 1, 2, 3], &["a", "b"], None).unwrap();
        assert_eq!(m.rows, vec![0, 3]);
        assert_eq!(m.x.dim(), (2, 2));
        assert_eq!(m.x[[1, 0]], 4.0);
        assert!(m.y.is_none());

        let m = feature_matrix(&df, &[3, 0], &["b"], Some("a")).unwrap();
        assert_eq!(m.rows, vec![3, 0]);
        assert_eq!(m.y.unwrap().to_vec(), vec![4.0, 1.0]);
    }

    #[test]
    fn test_take_rows_bounds() {
        let df = sample();
        assert_eq!(take_rows(&df, &[3, 1]).unwrap().height(), 2);
        assert!(matches!(
            take_rows(&df, &[4]).unwrap_err(),
            DataError::RowOutOfBounds { position: 4, height: 4 }
        ));
    }

    #[test]
    fn test_hhmm_and_millis() {
        let t = NaiveDate::from_ymd_opt(2021, 4, 1)
            .unwrap()
            .and_hms_opt(9, 40, 0)
            .unwrap();
        assert_eq!(hhmm_of(t), 940);
        assert_eq!(from_millis(to_millis(t)).unwrap(), t);
    }
}
