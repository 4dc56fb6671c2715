//! Caching layer for bucketed volume tables.

pub mod sqlite;

pub use sqlite::{CacheStats, SqliteCache};

use crate::error::Result;
use crate::provider::{LoadRequest, TimeSeriesProvider, slice_range};
use polars::prelude::DataFrame;
use std::path::PathBuf;

/// Default cache directory.
///
/// - Linux: `~/.cache/volcast/`
/// - macOS: `~/Library/Caches/volcast/`
/// - Windows: `%LOCALAPPDATA%\volcast\`
pub fn default_cache_dir() -> PathBuf {
    dirs::cache_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("volcast")
}

/// Default cache database path.
pub fn default_cache_path() -> PathBuf {
    default_cache_dir().join("volcast.db")
}

/// Open the cache at `path`, creating parent directories if needed.
pub fn open_cache(path: Option<PathBuf>) -> Result<SqliteCache> {
    let path = path.unwrap_or_else(default_cache_path);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    SqliteCache::new(&path)
}

/// Provider that serves covered ranges from SQLite and stores misses.
#[derive(Debug)]
pub struct CachedProvider<P> {
    inner: P,
    cache: SqliteCache,
    force_refresh: bool,
}

impl<P: TimeSeriesProvider> CachedProvider<P> {
    /// Wrap `inner` with `cache`.
    pub const fn new(inner: P, cache: SqliteCache) -> Self {
        Self {
            inner,
            cache,
            force_refresh: false,
        }
    }

    /// Always load from the inner provider, overwriting cached rows.
    pub const fn with_force_refresh(mut self, force_refresh: bool) -> Self {
        self.force_refresh = force_refresh;
        self
    }

    /// The underlying cache.
    pub const fn cache(&self) -> &SqliteCache {
        &self.cache
    }
}

impl<P: TimeSeriesProvider> TimeSeriesProvider for CachedProvider<P> {
    fn load(&self, request: &LoadRequest) -> Result<DataFrame> {
        if !self.force_refresh && self.cache.has_buckets(request)? {
            tracing::debug!(instrument = %request.instrument, "cache hit");
            return slice_range(self.cache.get_buckets(request)?, request);
        }

        tracing::debug!(instrument = %request.instrument, "cache miss");
        let df = self.inner.load(request)?;
        self.cache.put_buckets(request, &df)?;
        Ok(df)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::{InMemoryProvider, Instrument};
    use crate::table::{
        HHMM_COL, TIME_COL, VOLUME_COL, column_values, datetime_column, float_column, to_millis,
    };
    use chrono::{NaiveDate, NaiveDateTime};
    use polars::prelude::*;

    fn at(h: u32, m: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2021, 4, 1)
            .unwrap()
            .and_hms_opt(h, m, 0)
            .unwrap()
    }

    #[test]
    fn test_cached_provider_fills_cache() {
        let table = DataFrame::new(vec![
            datetime_column(TIME_COL, vec![to_millis(at(9, 40))]),
            Series::new(HHMM_COL.into(), vec![940i32]).into(),
            float_column(VOLUME_COL, vec![Some(7.0)]),
        ])
        .unwrap();
        let inner = InMemoryProvider::new().with_table(Instrument::Etf, table);
        let provider = CachedProvider::new(inner, SqliteCache::in_memory().unwrap());
        let request = LoadRequest::new(Instrument::Etf, at(9, 0), at(16, 0)).unwrap();

        let first = provider.load(&request).unwrap();
        assert!(provider.cache().has_buckets(&request).unwrap());
        let second = provider.load(&request).unwrap();
        assert_eq!(first.height(), second.height());
        assert_eq!(provider.cache().get_stats().unwrap().total_buckets, 1);
    }

    #[test]
    fn test_cached_reload_keeps_missing_volumes() {
        let table = DataFrame::new(vec![
            datetime_column(
                TIME_COL,
                vec![to_millis(at(9, 40)), to_millis(at(9, 50)), to_millis(at(10, 0))],
            ),
            Series::new(HHMM_COL.into(), vec![940i32, 950, 1000]).into(),
            float_column(VOLUME_COL, vec![Some(7.0), None, Some(9.0)]),
        ])
        .unwrap();
        let inner = InMemoryProvider::new().with_table(Instrument::Futures, table);
        let provider = CachedProvider::new(inner, SqliteCache::in_memory().unwrap());
        let request = LoadRequest::new(Instrument::Futures, at(9, 0), at(16, 0)).unwrap();

        let first = provider.load(&request).unwrap();
        let second = provider.load(&request).unwrap();
        assert_eq!(first.height(), 3);
        assert_eq!(second.height(), first.height());
        assert_eq!(
            column_values(&second, VOLUME_COL).unwrap(),
            column_values(&first, VOLUME_COL).unwrap()
        );
        assert_eq!(
            column_values(&second, HHMM_COL).unwrap(),
            vec![Some(940.0), Some(950.0), Some(1000.0)]
        );
    }

    #[test]
    fn test_default_cache_path() {
        let path = default_cache_path();
        assert!(path.ends_with("volcast/volcast.db"));
    }
}
