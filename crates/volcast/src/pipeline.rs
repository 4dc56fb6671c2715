//! End-to-end forecasting run.

use crate::config::{ModelChoice, PipelineConfig};
use crate::error::{PipelineError, Result};
use ndarray::{Array1, Array2};
use polars::prelude::*;
use serde::{Deserialize, Serialize};
use volcast_data::table::{column_values, feature_matrix, float_column, require_columns, take_rows};
use volcast_eval::{
    BaselineConfig, BaselineEvaluator, ImportanceExport, MetricsExport, RegressionMetrics, Report,
    ReportBuilder,
};
use volcast_features::{
    FeatureImportance, FeatureSelector, LagFeatureBuilder, OutlierCapper, SeasonalityRemover,
    RowSelection, SeasonalityRestorer, TimeSeriesSplitter, Transform, drop_incomplete_rows,
};
use volcast_models::{
    FeedForwardNetwork, GbtGrid, GradientBoostedTrees, GradientBoostingConfig, GridSearch,
    Regressor, SearchResult, Validation,
};

/// Row counts at the end of the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RowCounts {
    /// Rows of the input table
    pub input: usize,
    /// Complete training rows
    pub train: usize,
    /// Complete validation rows
    pub validation: usize,
    /// Complete test rows
    pub test: usize,
    /// Rows dropped for missing history
    pub dropped: usize,
}

/// Outcome of [`VolumePipeline::run`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Forecasting model name
    pub model: String,
    /// Feature ranking and selection
    pub importance: FeatureImportance,
    /// Model metrics on the test rows, in volume units
    pub model_metrics: RegressionMetrics,
    /// Persistence baseline metrics on the same test rows
    pub baseline_metrics: RegressionMetrics,
    /// Row counts
    pub rows: RowCounts,
    /// Grid search outcome, when a grid was configured
    pub search: Option<SearchResult<GradientBoostingConfig>>,
}

impl PipelineReport {
    /// Selected features in ranking order.
    pub fn selected_features(&self) -> &[String] {
        &self.importance.selected
    }

    /// Ranking as export rows.
    pub fn importance_rows(&self) -> Vec<ImportanceExport> {
        let n_selected = self.importance.selected.len();
        self.importance
            .ranking
            .iter()
            .zip(self.importance.cumulative())
            .enumerate()
            .map(|(i, ((feature, importance), cumulative))| ImportanceExport {
                rank: i + 1,
                feature: feature.clone(),
                importance: *importance,
                cumulative,
                selected: i < n_selected,
            })
            .collect()
    }

    /// Metrics of the model and the baseline as export rows.
    pub fn metrics_rows(&self) -> Vec<MetricsExport> {
        vec![
            MetricsExport::new(&self.model, &self.model_metrics),
            MetricsExport::new("baseline", &self.baseline_metrics),
        ]
    }

    /// Comparison report.
    pub fn to_report(&self) -> Report {
        let best = self.search.as_ref().map(|s| &s.best);
        let mut builder = ReportBuilder::new()
            .title("Volume forecast evaluation")
            .ranking(self.importance_rows())
            .details(serde_json::json!({
                "rows": self.rows,
                "threshold": self.importance.threshold,
                "best_params": best.map(|b| &b.params),
                "best_validation_mae": best.map(|b| b.score),
            }));
        for row in self.metrics_rows() {
            builder = builder.metrics(row);
        }
        builder.build()
    }
}

/// Runs the forecasting flow on a joined bucket table.
#[derive(Debug, Clone)]
pub struct VolumePipeline {
    config: PipelineConfig,
}

impl VolumePipeline {
    /// Create a pipeline, validating the configuration.
    pub fn new(config: PipelineConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self { config })
    }

    /// Get the configuration.
    pub const fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Split, cap and de-seasonalize `df`, then add lag features.
    ///
    /// Returns the transformed table (same rows as `df`) and the generated
    /// feature names.
    pub fn prepare(&self, df: &DataFrame) -> Result<(DataFrame, Vec<String>)> {
        let table = self.deseasonalized(df)?;
        Ok(LagFeatureBuilder::new(self.config.lags.clone())?.build(&table)?)
    }

    /// Capped table, de-seasonalized when configured.
    fn deseasonalized(&self, df: &DataFrame) -> Result<DataFrame> {
        let target = self.config.target_col();
        require_columns(df, &[target.as_str(), self.config.seasonality.hhmm_col.as_str()])?;

        let split = TimeSeriesSplitter::new(self.config.split)?.split(df.height())?;
        let mut table = df.clone();

        if let Some(outliers) = &self.config.outliers {
            let caps = OutlierCapper::new(outliers.clone())?.fit(&table, &split.train_rows())?;
            table = caps.apply(&table)?;
        }
        if self.config.remove_seasonality {
            table = SeasonalityRemover::new(self.config.seasonality.clone())?.apply(&table)?;
        }
        Ok(table)
    }

    /// Prepared table restricted to complete rows, with partitions remapped.
    fn complete(&self, df: &DataFrame) -> Result<Prepared> {
        let target = self.config.target_col();
        let split = TimeSeriesSplitter::new(self.config.split)?.split(df.height())?;

        let (lagged, features) = self.prepare(df)?;
        let mut required = features.clone();
        required.push(target);
        if self.config.remove_seasonality {
            required.push(self.config.seasonality.agg_col());
        }
        let (complete, kept) = drop_incomplete_rows(&lagged, &required)?;
        let train = kept.remap(&split.train_rows());
        let validation = kept.remap(&split.validation_rows());
        let test = kept.remap(&split.test_rows());
        if train.is_empty() || test.is_empty() {
            return Err(PipelineError::InsufficientData(format!(
                "{} complete training and {} complete test rows after warm-up",
                train.len(),
                test.len()
            )));
        }
        let rows = RowCounts {
            input: df.height(),
            train: train.len(),
            validation: validation.len(),
            test: test.len(),
            dropped: df.height() - kept.len(),
        };
        tracing::info!(?rows, features = features.len(), "features prepared");

        Ok(Prepared {
            lagged,
            complete,
            kept,
            features,
            train,
            validation,
            test,
            rows,
        })
    }

    fn rank(&self, prepared: &Prepared) -> Result<FeatureImportance> {
        let mut ranker = GradientBoostedTrees::new(self.config.selection_model.clone());
        Ok(FeatureSelector::new(self.config.selection)?.select(
            &prepared.complete,
            &prepared.train,
            &prepared.features,
            &self.config.target_col(),
            &mut ranker,
        )?)
    }

    /// Rank the lag features on the complete training rows and select the
    /// smallest prefix covering the threshold.
    pub fn select_features(&self, df: &DataFrame) -> Result<FeatureImportance> {
        self.rank(&self.complete(df)?)
    }

    /// Persistence baseline on the test partition of `df`.
    ///
    /// Test rows without history are excluded.
    pub fn evaluate_baseline(&self, df: &DataFrame) -> Result<RegressionMetrics> {
        let table = self.deseasonalized(df)?;
        let split = TimeSeriesSplitter::new(self.config.split)?.split(df.height())?;
        self.baseline(&table, &split.test_rows())
    }

    fn baseline(&self, table: &DataFrame, rows: &[usize]) -> Result<RegressionMetrics> {
        let target = self.config.target_col();
        let seasonality = &self.config.seasonality;
        let config = if self.config.remove_seasonality {
            BaselineConfig::deseasonalized(target, seasonality.agg_col())
        } else {
            BaselineConfig::bucketed(target, seasonality.hhmm_col.clone())
        };
        Ok(BaselineEvaluator::new(config)?.evaluate(table, rows)?)
    }

    /// Run the whole flow and score the model against the baseline.
    pub fn run(&self, df: &DataFrame) -> Result<PipelineReport> {
        let prepared = self.complete(df)?;
        let importance = self.rank(&prepared)?;
        let selected = &importance.selected;
        let target = self.config.target_col();
        let Prepared {
            lagged,
            complete,
            kept,
            train,
            validation,
            test,
            rows,
            ..
        } = &prepared;

        let (x_train, y_train) = xy(complete, train, selected, &target)?;
        let (x_val, y_val) = xy(complete, validation, selected, &target)?;
        let (x_test, y_test) = xy(complete, test, selected, &target)?;

        let mut search_result = None;
        let predictions = match &self.config.model {
            ModelChoice::GradientBoosting(base) => {
                let config = match &self.config.search {
                    Some(grid) => {
                        let result = self.search(grid, base, complete, train, validation, selected)?;
                        let best = result.best.params.clone();
                        search_result = Some(result);
                        best
                    }
                    None => base.clone(),
                };
                let eval = (config.early_stopping_rounds.is_some() && !validation.is_empty())
                    .then_some((&x_val, &y_val));
                let mut model = GradientBoostedTrees::new(config);
                model.fit_with_eval(&x_train, &y_train, eval)?;
                model.predict(&x_test)?
            }
            other => {
                let config = other.network_config()?.ok_or_else(|| {
                    PipelineError::Config("network configuration missing".to_string())
                })?;
                let mut model = FeedForwardNetwork::new(config);
                model.fit(&x_train, &y_train)?;
                model.predict(&x_test)?
            }
        };

        let model_metrics = self.score(complete, test, &predictions, &y_test)?;

        // Baseline on the same rows, located in the pre-drop table
        let baseline_rows: Vec<usize> = test.iter().map(|&i| kept.kept()[i]).collect();
        let baseline_metrics = self.baseline(lagged, &baseline_rows)?;

        tracing::info!(
            model = self.config.model.name(),
            r2 = model_metrics.r2,
            mae = model_metrics.mae,
            baseline_r2 = baseline_metrics.r2,
            baseline_mae = baseline_metrics.mae,
            "pipeline finished"
        );

        Ok(PipelineReport {
            model: self.config.model.name().to_string(),
            importance,
            model_metrics,
            baseline_metrics,
            rows: *rows,
            search: search_result,
        })
    }

    /// Grid search, scored on the validation rows or on folds spanning the
    /// training and validation rows.
    fn search(
        &self,
        grid: &GbtGrid,
        base: &GradientBoostingConfig,
        complete: &DataFrame,
        train: &[usize],
        validation: &[usize],
        features: &[String],
    ) -> Result<SearchResult<GradientBoostingConfig>> {
        let target = self.config.target_col();
        let searcher = GridSearch::new();

        match self.config.search_validation.folds()? {
            None => {
                if validation.is_empty() {
                    return Err(PipelineError::InsufficientData(
                        "grid search needs complete validation rows".to_string(),
                    ));
                }
                let (x_train, y_train) = xy(complete, train, features, &target)?;
                let (x_val, y_val) = xy(complete, validation, features, &target)?;
                Ok(grid.search(
                    base,
                    Validation::Holdout {
                        x_train: &x_train,
                        y_train: &y_train,
                        x_val: &x_val,
                        y_val: &y_val,
                    },
                    &searcher,
                )?)
            }
            Some(splitter) => {
                let rows: Vec<usize> = train.iter().chain(validation).copied().collect();
                let folds = splitter.folds(rows.len())?;
                let (x, y) = xy(complete, &rows, features, &target)?;
                tracing::debug!(folds = folds.len(), rows = rows.len(), "fold-validated grid search");
                Ok(grid.search(
                    base,
                    Validation::Folds {
                        x: &x,
                        y: &y,
                        folds: &folds,
                    },
                    &searcher,
                )?)
            }
        }
    }

    /// Metrics in volume units, adding the seasonal baseline back when the
    /// target was de-seasonalized.
    fn score(
        &self,
        complete: &DataFrame,
        test: &[usize],
        predictions: &Array1<f64>,
        y_test: &Array1<f64>,
    ) -> Result<RegressionMetrics> {
        let seasonality = &self.config.seasonality;
        let target = self.config.target_col();
        let pred_col = seasonality.pred_col();

        let mut frame = DataFrame::new(vec![
            float_column(&pred_col, predictions.iter().map(|v| Some(*v)).collect()),
            float_column(&target, y_test.iter().map(|v| Some(*v)).collect()),
        ])?;
        if self.config.remove_seasonality {
            let agg_col = seasonality.agg_col();
            let agg = column_values(&take_rows(complete, test)?, &agg_col)?;
            frame.with_column(float_column(&agg_col, agg))?;
            frame = SeasonalityRestorer::for_config(seasonality).apply(&frame)?;
        }

        Ok(RegressionMetrics::compute_paired(
            &column_values(&frame, &target)?,
            &column_values(&frame, &pred_col)?,
        )?)
    }
}

/// Intermediate state shared by selection and the full run.
struct Prepared {
    lagged: DataFrame,
    complete: DataFrame,
    kept: RowSelection,
    features: Vec<String>,
    train: Vec<usize>,
    validation: Vec<usize>,
    test: Vec<usize>,
    rows: RowCounts,
}

fn xy(
    table: &DataFrame,
    rows: &[usize],
    features: &[String],
    target: &str,
) -> Result<(Array2<f64>, Array1<f64>)> {
    let matrix = feature_matrix(table, rows, features, Some(target))?;
    let y = matrix
        .y
        .ok_or_else(|| PipelineError::InsufficientData(format!("target `{target}` missing")))?;
    Ok((matrix.x, y))
}
