#![doc = include_str!("../README.md")]
#![doc(issue_tracker_base_url = "https://github.com/factordynamics/volcast/issues/")]
#![cfg_attr(docsrs, feature(doc_cfg, doc_auto_cfg))]
#![warn(missing_docs)]
#![deny(unsafe_code)]

pub mod boosting;
pub mod error;
pub mod network;
pub mod parallel;
pub mod regressor;
pub mod search;
pub mod tree;

pub use boosting::{GradientBoostedTrees, GradientBoostingConfig};
pub use error::{ModelError, Result};
pub use network::{Activation, DnnConfig, FeedForwardNetwork, LayerConfig, Loss, Optimizer};
pub use parallel::map_slice;
pub use regressor::{Regressor, TreeAttribution};
pub use search::{Fold, GbtGrid, GridSearch, Scored, SearchResult, Validation};
pub use tree::{RegressionTree, TreeConfig};

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
