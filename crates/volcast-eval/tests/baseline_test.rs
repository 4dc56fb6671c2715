//! Integration tests for the persistence baseline.

use approx::assert_relative_eq;
use polars::prelude::*;
use volcast_data::table::float_column;
use volcast_eval::{
    BaselineConfig, BaselineEvaluator, ExportFormat, Exporter, MetricsExport, ReportBuilder,
};

/// Three buckets per day with a fixed intraday shape scaled by a daily level.
fn sessions(days: usize) -> DataFrame {
    let shape = [100.0, 50.0, 80.0];
    let mut hhmm = Vec::new();
    let mut volume = Vec::new();
    for day in 0..days {
        let level = 1.0 + day as f64 * 0.1;
        for (i, base) in shape.iter().enumerate() {
            hhmm.push([940i32, 950, 1000][i]);
            volume.push(Some(base * level));
        }
    }
    DataFrame::new(vec![
        Series::new("hhmm".into(), hhmm).into(),
        float_column("VOLUME_fut_target", volume),
    ])
    .unwrap()
}

#[test]
fn test_bucketed_persistence_error_tracks_daily_growth() {
    let df = sessions(4);
    let evaluator = BaselineEvaluator::new(BaselineConfig::default()).unwrap();
    let test_rows: Vec<usize> = (9..12).collect();
    let metrics = evaluator.evaluate(&df, &test_rows).unwrap();

    // Day 3 vs day 2: level 1.3 vs 1.2, so every error is 0.1 / 1.3 in relative terms
    assert_eq!(metrics.n, 3);
    assert_relative_eq!(metrics.mape, 0.1 / 1.3, epsilon = 1e-9);
    assert_relative_eq!(metrics.mae, (10.0 + 5.0 + 8.0) / 3.0, epsilon = 1e-9);
}

#[test]
fn test_first_day_has_no_history() {
    let df = sessions(1);
    let evaluator = BaselineEvaluator::new(BaselineConfig::default()).unwrap();
    assert!(evaluator.evaluate(&df, &[0, 1, 2]).is_err());
}

#[test]
fn test_metrics_flow_into_report() {
    let df = sessions(3);
    let evaluator = BaselineEvaluator::new(BaselineConfig::default()).unwrap();
    let metrics = evaluator.evaluate(&df, &[6, 7, 8]).unwrap();

    let rows = vec![MetricsExport::new("baseline", &metrics)];
    let csv = rows.export_to_string(ExportFormat::Csv).unwrap();
    assert!(csv.starts_with("model,r2,mae,mape,n"));

    let report = ReportBuilder::new().metrics(rows[0].clone()).build();
    assert!(report.to_ascii_table().contains("baseline"));
}
