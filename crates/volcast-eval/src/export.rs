//! CSV and JSON export of evaluation results.

use crate::error::Result;
use crate::metrics::RegressionMetrics;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::Write;
use std::path::Path;

/// Export format options.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportFormat {
    /// Comma-separated values
    Csv,
    /// Compact JSON
    Json,
    /// Pretty-printed JSON
    PrettyJson,
}

impl ExportFormat {
    /// File extension for this format.
    pub const fn extension(&self) -> &str {
        match self {
            Self::Csv => "csv",
            Self::Json | Self::PrettyJson => "json",
        }
    }
}

/// Metrics of one forecaster, labelled.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MetricsExport {
    /// Forecaster label (e.g. `baseline`, `gbt`)
    pub model: String,
    /// Coefficient of determination
    pub r2: f64,
    /// Mean absolute error
    pub mae: f64,
    /// Mean absolute percentage error (fraction)
    pub mape: f64,
    /// Number of scored rows
    pub n: usize,
}

impl MetricsExport {
    /// Label a set of metrics.
    pub fn new(model: impl Into<String>, metrics: &RegressionMetrics) -> Self {
        Self {
            model: model.into(),
            r2: metrics.r2,
            mae: metrics.mae,
            mape: metrics.mape,
            n: metrics.n,
        }
    }
}

/// One entry of a feature-importance ranking.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ImportanceExport {
    /// 1-based rank
    pub rank: usize,
    /// Feature name
    pub feature: String,
    /// Normalized importance
    pub importance: f64,
    /// Cumulative importance up to and including this feature
    pub cumulative: f64,
    /// Whether the feature was selected
    pub selected: bool,
}

/// Trait for exporting data in various formats.
pub trait Exporter {
    /// Export data to a string in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    fn export_to_string(&self, format: ExportFormat) -> Result<String>;

    /// Export data to a file in the specified format.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization or file writing fails.
    fn export_to_file(&self, path: &Path, format: ExportFormat) -> Result<()> {
        let content = self.export_to_string(format)?;
        let mut file = File::create(path)?;
        file.write_all(content.as_bytes())?;
        Ok(())
    }
}

fn csv_records<T: Serialize>(records: &[T]) -> Result<String> {
    let mut wtr = csv::Writer::from_writer(vec![]);
    for record in records {
        wtr.serialize(record)?;
    }
    let bytes = wtr.into_inner().map_err(|e| e.into_error())?;
    Ok(String::from_utf8_lossy(&bytes).into_owned())
}

fn export_records<T: Serialize>(records: &[T], format: ExportFormat) -> Result<String> {
    match format {
        ExportFormat::Csv => csv_records(records),
        ExportFormat::Json => Ok(serde_json::to_string(records)?),
        ExportFormat::PrettyJson => Ok(serde_json::to_string_pretty(records)?),
    }
}

impl Exporter for Vec<MetricsExport> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String> {
        export_records(self, format)
    }
}

impl Exporter for Vec<ImportanceExport> {
    fn export_to_string(&self, format: ExportFormat) -> Result<String> {
        export_records(self, format)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn metrics() -> Vec<MetricsExport> {
        let m = RegressionMetrics {
            r2: 0.5,
            mae: 12.25,
            mape: 0.1,
            n: 40,
        };
        vec![MetricsExport::new("baseline", &m), MetricsExport::new("gbt", &m)]
    }

    #[test]
    fn test_metrics_export_csv() {
        let csv = metrics().export_to_string(ExportFormat::Csv).unwrap();
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("model,r2,mae,mape,n"));
        assert_eq!(lines.next(), Some("baseline,0.5,12.25,0.1,40"));
        assert_eq!(csv.lines().count(), 3);
    }

    #[test]
    fn test_metrics_export_json() {
        let json = metrics().export_to_string(ExportFormat::Json).unwrap();
        let back: Vec<MetricsExport> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, metrics());

        let pretty = metrics().export_to_string(ExportFormat::PrettyJson).unwrap();
        assert!(pretty.contains("  "));
    }

    #[test]
    fn test_importance_export_to_file() {
        let ranking = vec![ImportanceExport {
            rank: 1,
            feature: "VOLUME_fut_lag_1".to_string(),
            importance: 0.7,
            cumulative: 0.7,
            selected: true,
        }];
        let dir = std::env::temp_dir().join(format!("volcast-export-{}", std::process::id()));
        std::fs::create_dir_all(&dir).unwrap();
        let path = dir.join("ranking.csv");
        ranking.export_to_file(&path, ExportFormat::Csv).unwrap();
        let text = std::fs::read_to_string(&path).unwrap();
        assert!(text.contains("VOLUME_fut_lag_1,0.7,0.7,true"));
        std::fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_format_extension() {
        assert_eq!(ExportFormat::Csv.extension(), "csv");
        assert_eq!(ExportFormat::PrettyJson.extension(), "json");
    }
}
