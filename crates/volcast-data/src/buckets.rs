//! Trade-to-bucket aggregation.
//!
//! Trades are summed into fixed-length intraday buckets within the regular
//! session. A bucket covers `[end - bucket_secs, end)` and is labelled by its
//! end time, so the default session produces 39 buckets labelled 940..1600.

use crate::error::{DataError, Result};
use crate::table::{HHMM_COL, TIME_COL, VOLUME_COL, datetime_column, float_column, hhmm_of, to_millis};
use chrono::{Duration, NaiveDateTime, NaiveTime};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single trade print.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Trade {
    /// Trade timestamp (exchange local time)
    pub time: NaiveDateTime,
    /// Traded size
    pub size: f64,
}

impl Trade {
    /// Create a new trade.
    pub const fn new(time: NaiveDateTime, size: f64) -> Self {
        Self { time, size }
    }
}

/// Intraday session and bucket length.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Session open (default: 09:30)
    pub open: NaiveTime,
    /// Session close (default: 16:00)
    pub close: NaiveTime,
    /// Bucket length in seconds (default: 600)
    pub bucket_secs: u32,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            open: NaiveTime::from_hms_opt(9, 30, 0).unwrap_or_default(),
            close: NaiveTime::from_hms_opt(16, 0, 0).unwrap_or_default(),
            bucket_secs: 600,
        }
    }
}

impl SessionConfig {
    /// Check that the session is non-empty and the bucket length positive.
    pub fn validate(&self) -> Result<()> {
        if self.bucket_secs == 0 {
            return Err(DataError::Config("bucket_secs must be positive".to_string()));
        }
        if self.open >= self.close {
            return Err(DataError::Config(format!(
                "session open {} must precede close {}",
                self.open, self.close
            )));
        }
        Ok(())
    }

    /// Number of buckets per session (39 for the default session).
    pub fn bins(&self) -> usize {
        let seconds = (self.close - self.open).num_seconds().max(0) as u64;
        seconds.div_ceil(u64::from(self.bucket_secs.max(1))) as usize
    }

    /// Bucket label for a timestamp, or `None` outside the session.
    pub fn bucket_end(&self, time: NaiveDateTime) -> Option<NaiveDateTime> {
        let tod = time.time();
        if tod < self.open || tod >= self.close {
            return None;
        }
        let bucket = i64::from(self.bucket_secs);
        let offset = (tod - self.open).num_seconds();
        let end = self.open + Duration::seconds((offset / bucket + 1) * bucket);
        let end = end.min(self.close);
        Some(time.date().and_time(end))
    }
}

/// Sum trade sizes into session buckets.
///
/// Returns `time`, `hhmm` and `VOLUME` sorted by time. Trades outside the
/// session are ignored and buckets without volume are dropped.
pub fn aggregate_trades(trades: &[Trade], session: &SessionConfig) -> Result<DataFrame> {
    session.validate()?;

    let mut buckets: BTreeMap<NaiveDateTime, f64> = BTreeMap::new();
    let mut outside = 0usize;
    for trade in trades {
        match session.bucket_end(trade.time) {
            Some(end) => *buckets.entry(end).or_insert(0.0) += trade.size,
            None => outside += 1,
        }
    }
    if outside > 0 {
        tracing::debug!(outside, "ignored trades outside the session");
    }

    let (times, volumes): (Vec<_>, Vec<_>) =
        buckets.into_iter().filter(|(_, volume)| *volume > 0.0).unzip();

    let hhmm: Vec<i32> = times.iter().map(|t| hhmm_of(*t)).collect();
    let millis: Vec<i64> = times.into_iter().map(to_millis).collect();

    Ok(DataFrame::new(vec![
        datetime_column(TIME_COL, millis),
        Series::new(HHMM_COL.into(), hhmm).into(),
        float_column(VOLUME_COL, volumes.into_iter().map(Some).collect()),
    ])?)
}
