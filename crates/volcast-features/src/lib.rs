#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/volcast/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod error;
pub mod lags;
pub mod outliers;
pub mod seasonality;
pub mod selection;
pub mod split;
pub mod transform;

pub use error::{FeatureError, Result};
pub use lags::{
    DEFAULT_LAGS, LagConfig, LagFeatureBuilder, RowSelection, drop_incomplete_rows, lag_name,
};
pub use outliers::{Bounds, FittedCaps, OutlierCapper, OutlierConfig};
pub use seasonality::{SeasonalityConfig, SeasonalityRemover, SeasonalityRestorer};
pub use selection::{FeatureImportance, FeatureSelector, SelectionConfig};
pub use split::{Split, SplitConfig, TimeSeriesFolds, TimeSeriesSplitter};
pub use transform::{Transform, apply_all};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
