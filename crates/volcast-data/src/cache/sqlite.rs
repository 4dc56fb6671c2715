//! SQLite store for bucketed volume tables.

use crate::error::{DataError, Result};
use crate::provider::{Instrument, LoadRequest};
use crate::table::{HHMM_COL, TIME_COL, VOLUME_COL, column_values, datetime_column, float_column, require_columns, timestamps, to_millis};
use chrono::Utc;
use polars::prelude::*;
use rusqlite::{Connection, params};
use std::path::Path;

/// SQLite cache of per-instrument bucket tables.
#[derive(Debug)]
pub struct SqliteCache {
    conn: Connection,
}

impl SqliteCache {
    /// Open (or create) a cache database at `path`.
    pub fn new<P: AsRef<Path>>(path: P) -> Result<Self> {
        let conn = Connection::open(path)?;
        let cache = Self { conn };
        cache.initialize_schema()?;
        Ok(cache)
    }

    /// Create an in-memory cache.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()?;
        let cache = Self { conn };
        cache.initialize_schema()?;
        Ok(cache)
    }

    fn initialize_schema(&self) -> Result<()> {
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS buckets (
                instrument TEXT NOT NULL,
                time_ms INTEGER NOT NULL,
                hhmm INTEGER NOT NULL,
                volume REAL,
                cached_at TEXT NOT NULL,
                PRIMARY KEY (instrument, time_ms)
            )",
            [],
        )?;

        // Ranges that were fully loaded from the upstream provider
        self.conn.execute(
            "CREATE TABLE IF NOT EXISTS coverage (
                instrument TEXT NOT NULL,
                start_ms INTEGER NOT NULL,
                end_ms INTEGER NOT NULL,
                cached_at TEXT NOT NULL,
                PRIMARY KEY (instrument, start_ms, end_ms)
            )",
            [],
        )?;

        Ok(())
    }

    /// Whether a previously stored load covers the whole request.
    pub fn has_buckets(&self, request: &LoadRequest) -> Result<bool> {
        let count: i64 = self.conn.query_row(
            "SELECT COUNT(*) FROM coverage
             WHERE instrument = ?1 AND start_ms <= ?2 AND end_ms >= ?3",
            params![
                request.instrument.suffix(),
                to_millis(request.start),
                to_millis(request.end)
            ],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    /// Read cached buckets for the request range, sorted by time.
    pub fn get_buckets(&self, request: &LoadRequest) -> Result<DataFrame> {
        let mut stmt = self.conn.prepare(
            "SELECT time_ms, hhmm, volume FROM buckets
             WHERE instrument = ?1 AND time_ms >= ?2 AND time_ms <= ?3
             ORDER BY time_ms ASC",
        )?;

        let rows = stmt.query_map(
            params![
                request.instrument.suffix(),
                to_millis(request.start),
                to_millis(request.end)
            ],
            |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, i32>(1)?,
                    row.get::<_, Option<f64>>(2)?,
                ))
            },
        )?;

        let mut times = Vec::new();
        let mut hhmm = Vec::new();
        let mut volumes = Vec::new();
        for row in rows {
            let (time, bucket, volume) = row?;
            times.push(time);
            hhmm.push(bucket);
            volumes.push(volume);
        }

        if times.is_empty() {
            return Err(DataError::MissingData {
                instrument: request.instrument.to_string(),
                reason: "No cached buckets found".to_string(),
            });
        }

        Ok(DataFrame::new(vec![
            datetime_column(TIME_COL, times),
            Series::new(HHMM_COL.into(), hhmm).into(),
            float_column(VOLUME_COL, volumes),
        ])?)
    }

    /// Store every bucket row for the request and mark its range as covered.
    pub fn put_buckets(&self, request: &LoadRequest, df: &DataFrame) -> Result<()> {
        require_columns(df, &[TIME_COL, HHMM_COL, VOLUME_COL])?;
        let cached_at = Utc::now().to_rfc3339();
        let instrument = request.instrument.suffix();

        let times = timestamps(df, TIME_COL)?;
        let hhmm = column_values(df, HHMM_COL)?;
        let volumes = column_values(df, VOLUME_COL)?;

        let tx = self.conn.unchecked_transaction()?;
        for i in 0..df.height() {
            let time = times[i].ok_or_else(|| DataError::Cache(format!("Missing time at row {i}")))?;
            let bucket = hhmm[i].ok_or_else(|| DataError::Cache(format!("Missing hhmm at row {i}")))?;
            // Missing volumes are stored as NULL so reloads keep every row
            let volume = volumes[i];

            tx.execute(
                "INSERT OR REPLACE INTO buckets (instrument, time_ms, hhmm, volume, cached_at)
                 VALUES (?1, ?2, ?3, ?4, ?5)",
                params![instrument, time, bucket as i32, volume, cached_at],
            )?;
        }
        tx.execute(
            "INSERT OR REPLACE INTO coverage (instrument, start_ms, end_ms, cached_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![
                instrument,
                to_millis(request.start),
                to_millis(request.end),
                cached_at
            ],
        )?;
        tx.commit()?;
        Ok(())
    }

    /// Remove everything cached for one instrument.
    pub fn clear_instrument(&self, instrument: Instrument) -> Result<()> {
        self.conn.execute(
            "DELETE FROM buckets WHERE instrument = ?1",
            params![instrument.suffix()],
        )?;
        self.conn.execute(
            "DELETE FROM coverage WHERE instrument = ?1",
            params![instrument.suffix()],
        )?;
        Ok(())
    }

    /// Remove all cached data.
    pub fn clear_all(&self) -> Result<()> {
        self.conn.execute("DELETE FROM buckets", [])?;
        self.conn.execute("DELETE FROM coverage", [])?;
        Ok(())
    }

    /// Cache statistics.
    pub fn get_stats(&self) -> Result<CacheStats> {
        let total_buckets: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM buckets", [], |row| row.get(0))?;
        let instruments: i64 = self.conn.query_row(
            "SELECT COUNT(DISTINCT instrument) FROM buckets",
            [],
            |row| row.get(0),
        )?;
        let ranges: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM coverage", [], |row| row.get(0))?;

        Ok(CacheStats {
            total_buckets: total_buckets as usize,
            instruments: instruments as usize,
            covered_ranges: ranges as usize,
        })
    }
}

/// Cache statistics.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheStats {
    /// Number of stored bucket rows
    pub total_buckets: usize,
    /// Number of instruments with stored buckets
    pub instruments: usize,
    /// Number of loaded ranges recorded
    pub covered_ranges: usize,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{NaiveDate, NaiveDateTime};

    fn at(day: u32, h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 4, day)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    fn buckets() -> DataFrame {
        DataFrame::new(vec![
            datetime_column(TIME_COL, vec![to_millis(at(1, 9, 40)), to_millis(at(1, 9, 50))]),
            Series::new(HHMM_COL.into(), vec![940i32, 950]).into(),
            float_column(VOLUME_COL, vec![Some(10.0), Some(20.0)]),
        ])
        .unwrap()
    }

    #[test]
    fn test_cache_initialization() {
        let cache = SqliteCache::in_memory().unwrap();
        let stats = cache.get_stats().unwrap();
        assert_eq!(stats.total_buckets, 0);
        assert_eq!(stats.covered_ranges, 0);
    }

    #[test]
    fn test_put_and_get_buckets() {
        let cache = SqliteCache::in_memory().unwrap();
        let request = LoadRequest::new(Instrument::Futures, at(1, 0, 0), at(1, 23, 0)).unwrap();
        assert!(!cache.has_buckets(&request).unwrap());

        cache.put_buckets(&request, &buckets()).unwrap();
        assert!(cache.has_buckets(&request).unwrap());

        let narrower = LoadRequest::new(Instrument::Futures, at(1, 9, 45), at(1, 10, 0)).unwrap();
        assert!(cache.has_buckets(&narrower).unwrap());
        let df = cache.get_buckets(&narrower).unwrap();
        assert_eq!(column_values(&df, VOLUME_COL).unwrap(), vec![Some(20.0)]);

        let wider = LoadRequest::new(Instrument::Futures, at(1, 0, 0), at(2, 23, 0)).unwrap();
        assert!(!cache.has_buckets(&wider).unwrap());

        let stats = cache.get_stats().unwrap();
        assert_eq!(stats.total_buckets, 2);
        assert_eq!(stats.instruments, 1);
    }

    #[test]
    fn test_clear_operations() {
        let cache = SqliteCache::in_memory().unwrap();
        let fut = LoadRequest::new(Instrument::Futures, at(1, 0, 0), at(1, 23, 0)).unwrap();
        let etf = LoadRequest::new(Instrument::Etf, at(1, 0, 0), at(1, 23, 0)).unwrap();
        cache.put_buckets(&fut, &buckets()).unwrap();
        cache.put_buckets(&etf, &buckets()).unwrap();

        cache.clear_instrument(Instrument::Futures).unwrap();
        assert!(!cache.has_buckets(&fut).unwrap());
        assert!(cache.has_buckets(&etf).unwrap());
        assert!(matches!(
            cache.get_buckets(&fut),
            Err(DataError::MissingData { .. })
        ));

        cache.clear_all().unwrap();
        assert_eq!(cache.get_stats().unwrap().total_buckets, 0);
    }
}
