#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/volcast/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod baseline;
pub mod error;
pub mod export;
pub mod metrics;
pub mod report;

pub use baseline::{BaselineConfig, BaselineEvaluator, ORIGINAL_COL, PREDICTION_COL};
pub use error::{EvalError, Result};
pub use export::{ExportFormat, Exporter, ImportanceExport, MetricsExport};
pub use metrics::{
    RegressionMetrics, mean_absolute_error, mean_absolute_percentage_error, r2_score,
};
pub use report::{Report, ReportBuilder};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
