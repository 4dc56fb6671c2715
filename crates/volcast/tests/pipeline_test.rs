//! End-to-end runs on a synthetic three-bucket session table.

use polars::prelude::*;
use rstest::rstest;
use std::io::Write;
use volcast::data::table::{datetime_column, float_column};
use volcast::features::{LagConfig, SeasonalityConfig};
use volcast::models::{GbtGrid, GradientBoostingConfig};
use volcast::{ModelChoice, PipelineConfig, PipelineError, SearchValidation, VolumePipeline};

const DAY_MS: i64 = 86_400_000;

/// Three buckets a day with a fixed intraday shape, a daily level cycling over
/// five days and a small deterministic wiggle.
fn sessions(days: usize) -> DataFrame {
    let shape = [300.0, 120.0, 240.0];
    let hhmm = [940i32, 950, 1000];
    let n = days * 3;

    let mut time = Vec::with_capacity(n);
    let mut bucket = Vec::with_capacity(n);
    let mut fut = Vec::with_capacity(n);
    for i in 0..n {
        let day = (i / 3) as i64;
        let b = i % 3;
        time.push(1_617_269_400_000 + day * DAY_MS + b as i64 * 600_000);
        bucket.push(hhmm[b]);
        let level = 1.0 + 0.1 * ((i / 3) % 5) as f64;
        let wiggle = ((i * 7) % 11) as f64;
        fut.push(Some(shape[b] * level + wiggle));
    }
    let scaled = |k: f64| fut.iter().map(|v| v.map(|x| x * k)).collect::<Vec<_>>();

    DataFrame::new(vec![
        datetime_column("time", time),
        Series::new("hhmm".into(), bucket).into(),
        float_column("VOLUME_fut", fut.clone()),
        float_column("VOLUME_etf", scaled(2.0)),
        float_column("VOLUME_opt", scaled(0.5)),
        float_column("VOLUME_fut_target", fut.clone()),
    ])
    .unwrap()
}

fn small_config() -> PipelineConfig {
    PipelineConfig {
        seasonality: SeasonalityConfig {
            bins: 3,
            window_days: 2,
            ..SeasonalityConfig::new(["VOLUME_fut", "VOLUME_etf", "VOLUME_opt"])
        },
        lags: LagConfig::new(["VOLUME_fut", "VOLUME_etf"]).with_lags(&[1, 2, 3]),
        selection_model: GradientBoostingConfig {
            n_estimators: 20,
            ..Default::default()
        },
        model: ModelChoice::GradientBoosting(GradientBoostingConfig {
            n_estimators: 30,
            ..Default::default()
        }),
        ..Default::default()
    }
}

#[test]
fn test_deseasonalized_run_scores_model_and_baseline_on_same_rows() {
    let df = sessions(60);
    let report = VolumePipeline::new(small_config()).unwrap().run(&df).unwrap();

    // 6 warm-up rows, then 3 more until every lag exists
    assert_eq!(report.rows.input, 180);
    assert_eq!(report.rows.dropped, 9);
    assert_eq!(report.rows.train, 144 - 9);
    assert_eq!(report.rows.validation, 18);
    assert_eq!(report.rows.test, 18);

    assert_eq!(report.model_metrics.n, 18);
    assert_eq!(report.baseline_metrics.n, 18);
    assert!(report.model_metrics.mae.is_finite());
    assert!(report.model_metrics.mape.is_finite());
    assert!(!report.selected_features().is_empty());
    assert_eq!(report.importance.ranking.len(), 6);

    let table = report.to_report().to_ascii_table();
    assert!(table.contains("gradient_boosting"));
    assert!(table.contains("baseline"));
}

#[rstest]
#[case::boosting(ModelChoice::GradientBoosting(GradientBoostingConfig { n_estimators: 30, ..Default::default() }))]
#[case::network(ModelChoice::NetworkOptions(
    serde_json::json!({ "hid_layers_num": 1, "neurons_num_layer1": 4 })
        .as_object()
        .cloned()
        .unwrap()
))]
fn test_raw_volume_run(#[case] model: ModelChoice) {
    let df = sessions(40);
    let config = PipelineConfig {
        remove_seasonality: false,
        model,
        ..small_config()
    };
    let report = VolumePipeline::new(config).unwrap().run(&df).unwrap();

    // Lags only; no seasonal warm-up
    assert_eq!(report.rows.dropped, 3);
    assert_eq!(report.model_metrics.n, report.rows.test);
    assert!(report.model_metrics.mae.is_finite());
    assert!(report.baseline_metrics.mae.is_finite());
}

#[rstest]
#[case::holdout(SearchValidation::Holdout)]
#[case::folds(SearchValidation::Folds { n_splits: 3 })]
fn test_grid_search_picks_lowest_score(#[case] search_validation: SearchValidation) {
    let df = sessions(60);
    let config = PipelineConfig {
        search: Some(GbtGrid {
            n_estimators: vec![5, 30],
            max_depth: vec![2],
            learning_rate: vec![0.1],
        }),
        search_validation,
        ..small_config()
    };
    let report = VolumePipeline::new(config).unwrap().run(&df).unwrap();
    let search = report.search.as_ref().unwrap();
    assert_eq!(search.all.len(), 2);
    assert!(search.all.iter().all(|s| s.score >= search.best.score));
    assert!(search.best.score.is_finite());
    assert_eq!(report.model_metrics.n, 18);

    let details = report.to_report().details;
    assert!(details["best_params"]["max_depth"] == 2);
}

#[test]
fn test_fold_search_needs_enough_rows() {
    // 153 complete train and validation rows cannot fill 200 folds
    let config = PipelineConfig {
        search: Some(GbtGrid {
            n_estimators: vec![5],
            max_depth: vec![2],
            learning_rate: vec![0.1],
        }),
        search_validation: SearchValidation::Folds { n_splits: 200 },
        ..small_config()
    };
    let err = VolumePipeline::new(config).unwrap().run(&sessions(60)).unwrap_err();
    assert!(matches!(err, PipelineError::Feature(_)));
}

#[test]
fn test_config_from_file() {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    write!(
        file,
        r#"{{ "remove_seasonality": false, "lags": {{ "columns": ["VOLUME_fut"], "lags": [1, 3] }} }}"#
    )
    .unwrap();
    let config = PipelineConfig::from_file(file.path()).unwrap();
    assert!(!config.remove_seasonality);
    assert_eq!(config.lags.lags, vec![1, 3]);
    assert!(VolumePipeline::new(config).is_ok());
}

#[test]
fn test_too_short_table() {
    let df = sessions(3);
    let err = VolumePipeline::new(small_config()).unwrap().run(&df).unwrap_err();
    assert!(matches!(err, PipelineError::InsufficientData(_)));
}

#[test]
fn test_missing_target_column() {
    let df = sessions(10).drop("VOLUME_fut_target").unwrap();
    assert!(VolumePipeline::new(small_config()).unwrap().run(&df).is_err());
}

#[test]
fn test_select_features_ranks_every_lag() {
    let df = sessions(60);
    let importance = VolumePipeline::new(small_config())
        .unwrap()
        .select_features(&df)
        .unwrap();
    assert_eq!(importance.ranking.len(), 6);
    assert!(!importance.selected.is_empty());
    for (name, (ranked, _)) in importance.selected.iter().zip(&importance.ranking) {
        assert_eq!(name, ranked);
    }
}

#[rstest]
#[case(true)]
#[case(false)]
fn test_standalone_baseline_scores_test_partition(#[case] remove_seasonality: bool) {
    let df = sessions(60);
    let config = PipelineConfig {
        remove_seasonality,
        ..small_config()
    };
    let metrics = VolumePipeline::new(config)
        .unwrap()
        .evaluate_baseline(&df)
        .unwrap();
    assert_eq!(metrics.n, 18);
    assert!(metrics.mae.is_finite());
}
