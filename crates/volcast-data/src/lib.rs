#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/volcast/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod buckets;
pub mod cache;
pub mod error;
pub mod io;
pub mod join;
pub mod provider;
pub mod table;

pub use buckets::{SessionConfig, Trade, aggregate_trades};
pub use cache::{CacheStats, CachedProvider, SqliteCache};
pub use error::{DataError, Result};
pub use join::{TARGET_COL, join_instruments, load_joined};
pub use provider::{CsvProvider, InMemoryProvider, Instrument, LoadRequest, TimeSeriesProvider};
pub use table::{FeatureMatrix, HHMM_COL, TIME_COL, VOLUME_COL};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
