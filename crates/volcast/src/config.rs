//! Pipeline configuration.

use crate::error::{PipelineError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::path::Path;
use volcast_features::{
    LagConfig, OutlierConfig, SeasonalityConfig, SelectionConfig, SplitConfig, TimeSeriesFolds,
};
use volcast_models::{DnnConfig, GbtGrid, GradientBoostingConfig};

/// Volume columns of a joined table.
pub const VOLUME_COLUMNS: [&str; 3] = ["VOLUME_fut", "VOLUME_etf", "VOLUME_opt"];

/// Forecasting model.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ModelChoice {
    /// Gradient-boosted trees
    GradientBoosting(GradientBoostingConfig),
    /// Feed-forward network
    Network(DnnConfig),
    /// Feed-forward network from flat options (`hid_layers_num`,
    /// `neurons_num_layer1`, ...)
    NetworkOptions(Map<String, Value>),
}

impl Default for ModelChoice {
    fn default() -> Self {
        Self::GradientBoosting(GradientBoostingConfig::default())
    }
}

impl ModelChoice {
    /// Short model name used in reports.
    pub const fn name(&self) -> &'static str {
        match self {
            Self::GradientBoosting(_) => "gradient_boosting",
            Self::Network(_) | Self::NetworkOptions(_) => "network",
        }
    }

    /// Network configuration, parsing flat options when needed.
    pub fn network_config(&self) -> Result<Option<DnnConfig>> {
        match self {
            Self::GradientBoosting(_) => Ok(None),
            Self::Network(config) => Ok(Some(config.clone())),
            Self::NetworkOptions(options) => Ok(Some(DnnConfig::from_options(options)?)),
        }
    }

    fn validate(&self) -> Result<()> {
        match self {
            Self::GradientBoosting(config) => config.validate()?,
            other => {
                if let Some(config) = other.network_config()? {
                    config.validate()?;
                }
            }
        }
        Ok(())
    }
}

/// How grid-search candidates are scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SearchValidation {
    /// Fit on the training rows, score on the validation rows
    Holdout,
    /// Mean MAE over expanding-window folds of the training and validation rows
    Folds {
        /// Number of folds
        n_splits: usize,
    },
}

impl Default for SearchValidation {
    fn default() -> Self {
        Self::Folds { n_splits: 10 }
    }
}

impl SearchValidation {
    /// Fold generator, when scoring by folds.
    pub fn folds(&self) -> Result<Option<TimeSeriesFolds>> {
        match self {
            Self::Holdout => Ok(None),
            Self::Folds { n_splits } => Ok(Some(TimeSeriesFolds::new(*n_splits)?)),
        }
    }
}

/// End-to-end pipeline configuration.
///
/// The target column is `{base_col}_target` where `base_col` comes from the
/// seasonality section, which also names the bucket column.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct PipelineConfig {
    /// Partition fractions
    pub split: SplitConfig,
    /// Outlier capping; `None` disables it
    pub outliers: Option<OutlierConfig>,
    /// De-seasonalize before building features (default: true)
    pub remove_seasonality: bool,
    /// Seasonal baseline options, base and bucket columns
    pub seasonality: SeasonalityConfig,
    /// Lagged columns and offsets
    pub lags: LagConfig,
    /// Feature selection threshold
    pub selection: SelectionConfig,
    /// Model ranking the features
    pub selection_model: GradientBoostingConfig,
    /// Forecasting model
    pub model: ModelChoice,
    /// Boosting grid searched before the final fit
    pub search: Option<GbtGrid>,
    /// Scoring of grid candidates (default: 10 folds)
    pub search_validation: SearchValidation,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        let mut outliers = OutlierConfig::new(VOLUME_COLUMNS);
        outliers.columns.push("VOLUME_fut_target".to_string());
        Self {
            split: SplitConfig::default(),
            outliers: Some(outliers),
            remove_seasonality: true,
            seasonality: SeasonalityConfig::new(VOLUME_COLUMNS),
            lags: LagConfig::new(VOLUME_COLUMNS),
            selection: SelectionConfig::default(),
            selection_model: GradientBoostingConfig::default(),
            model: ModelChoice::default(),
            search: None,
            search_validation: SearchValidation::default(),
        }
    }
}

impl PipelineConfig {
    /// Load a configuration from a JSON file.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json(&text)
    }

    /// Parse a configuration from JSON; missing fields take their defaults.
    pub fn from_json(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    /// Serialize to pretty JSON.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// `{base_col}_target`
    pub fn target_col(&self) -> String {
        self.seasonality.target_col()
    }

    /// Validate every section.
    pub fn validate(&self) -> Result<()> {
        self.split.validate()?;
        if let Some(outliers) = &self.outliers {
            outliers.validate()?;
        }
        if self.remove_seasonality {
            self.seasonality.validate()?;
        }
        self.lags.validate()?;
        self.selection.validate()?;
        self.selection_model.validate()?;
        self.model.validate()?;

        if let Some(grid) = &self.search {
            if !matches!(self.model, ModelChoice::GradientBoosting(_)) {
                return Err(PipelineError::Config(
                    "grid search is only available for gradient_boosting".to_string(),
                ));
            }
            if grid.n_estimators.is_empty() || grid.max_depth.is_empty() || grid.learning_rate.is_empty() {
                return Err(PipelineError::Config("search grid has an empty axis".to_string()));
            }
            self.search_validation.folds()?;
        }

        let target = self.target_col();
        if self.lags.columns.contains(&target) {
            return Err(PipelineError::Config(format!(
                "target `{target}` cannot be lagged; lag `{}` instead",
                self.seasonality.base_col
            )));
        }
        Ok(())
    }
}
