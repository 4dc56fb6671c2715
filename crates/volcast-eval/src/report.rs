//! Comparison report for a forecasting run.

use crate::error::Result;
use crate::export::{ImportanceExport, MetricsExport};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Metrics of several forecasters on the same test rows.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    /// Report title
    pub title: String,
    /// Generation timestamp
    pub timestamp: DateTime<Utc>,
    /// One row per forecaster
    pub metrics: Vec<MetricsExport>,
    /// Feature ranking used by the model, if any
    pub ranking: Vec<ImportanceExport>,
    /// Free-form run details
    pub details: serde_json::Value,
}

impl Report {
    /// Create a new report.
    pub fn new(
        title: String,
        metrics: Vec<MetricsExport>,
        ranking: Vec<ImportanceExport>,
        details: serde_json::Value,
    ) -> Self {
        Self {
            title,
            timestamp: Utc::now(),
            metrics,
            ranking,
            details,
        }
    }

    /// Convert report to a pretty JSON string.
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    /// Render the metrics (and the selected features) as a text table.
    pub fn to_ascii_table(&self) -> String {
        let mut output = String::new();

        output.push_str(&format!("\n{}\n", self.title));
        output.push_str(&"=".repeat(64));
        output.push('\n');
        output.push_str(&format!(
            "{:<16} {:>10} {:>14} {:>10} {:>8}\n",
            "Model", "R2", "MAE", "MAPE", "Rows"
        ));
        output.push_str(&"-".repeat(64));
        output.push('\n');
        for row in &self.metrics {
            output.push_str(&format!(
                "{:<16} {:>10.4} {:>14.2} {:>9.2}% {:>8}\n",
                row.model,
                row.r2,
                row.mae,
                row.mape * 100.0,
                row.n
            ));
        }

        let selected: Vec<&ImportanceExport> = self.ranking.iter().filter(|r| r.selected).collect();
        if !selected.is_empty() {
            output.push_str(&format!(
                "\nSelected features ({} of {}):\n",
                selected.len(),
                self.ranking.len()
            ));
            output.push_str(&"-".repeat(64));
            output.push('\n');
            for entry in selected {
                output.push_str(&format!(
                    "{:>3}. {:<32} {:>8.4} {:>8.4}\n",
                    entry.rank, entry.feature, entry.importance, entry.cumulative
                ));
            }
        }

        output
    }
}

/// Builder for creating reports.
#[derive(Debug, Default)]
pub struct ReportBuilder {
    title: Option<String>,
    metrics: Vec<MetricsExport>,
    ranking: Vec<ImportanceExport>,
    details: Option<serde_json::Value>,
}

impl ReportBuilder {
    /// Create a new report builder.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the title.
    pub fn title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Add one forecaster's metrics.
    pub fn metrics(mut self, row: MetricsExport) -> Self {
        self.metrics.push(row);
        self
    }

    /// Set the feature ranking.
    pub fn ranking(mut self, ranking: Vec<ImportanceExport>) -> Self {
        self.ranking = ranking;
        self
    }

    /// Set the run details.
    pub fn details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    /// Build the report.
    pub fn build(self) -> Report {
        Report::new(
            self.title
                .unwrap_or_else(|| "Volume forecast evaluation".to_string()),
            self.metrics,
            self.ranking,
            self.details.unwrap_or(serde_json::Value::Null),
        )
    }
}
