#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/volcast/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![forbid(unsafe_code)]

pub mod config;
pub mod error;
pub mod pipeline;

// Re-export sub-crates
pub use volcast_data as data;
pub use volcast_eval as eval;
pub use volcast_features as features;
pub use volcast_models as models;

pub use config::{ModelChoice, PipelineConfig, SearchValidation, VOLUME_COLUMNS};
pub use error::{PipelineError, Result};
pub use pipeline::{PipelineReport, RowCounts, VolumePipeline};

/// Version information.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
