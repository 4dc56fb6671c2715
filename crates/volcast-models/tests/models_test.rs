//! Integration tests for the boosted model and grid search.

use approx::assert_relative_eq;
use ndarray::{Array1, Array2};
use rstest::rstest;
use volcast_models::{
    Fold, GbtGrid, GradientBoostedTrees, GradientBoostingConfig, GridSearch, Regressor,
    TreeAttribution, Validation,
};

/// Target driven by the first column; the others carry little or no signal.
fn data(n: usize) -> (Array2<f64>, Array1<f64>) {
    let x = Array2::from_shape_fn((n, 3), |(i, j)| match j {
        0 => (i % 10) as f64,
        1 => ((i * 7) % 5) as f64,
        _ => ((i * 3) % 4) as f64,
    });
    let y = x
        .rows()
        .into_iter()
        .map(|r| 5.0 * r[0] + 0.5 * r[1])
        .collect::<Array1<f64>>();
    (x, y)
}

#[rstest]
#[case(1.0, 1.0)]
#[case(0.7, 0.67)]
fn test_attributions_add_up_to_predictions(#[case] subsample: f64, #[case] colsample: f64) {
    let (x, y) = data(80);
    let mut model = GradientBoostedTrees::new(GradientBoostingConfig {
        n_estimators: 30,
        subsample,
        colsample,
        ..Default::default()
    });
    model.fit(&x, &y).unwrap();

    let pred = model.predict(&x).unwrap();
    let attributions = model.attributions(&x).unwrap();
    let base = model.expected_value().unwrap();
    assert_eq!(attributions.dim(), x.dim());
    for i in 0..x.nrows() {
        assert_relative_eq!(base + attributions.row(i).sum(), pred[i], epsilon = 1e-6);
    }
}

#[test]
fn test_attribution_ranks_informative_feature_first() {
    let (x, y) = data(100);
    let mut model = GradientBoostedTrees::default();
    model.fit(&x, &y).unwrap();

    let attributions = model.attributions(&x).unwrap();
    let mean_abs: Vec<f64> = (0..3)
        .map(|j| attributions.column(j).mapv(f64::abs).mean().unwrap_or(0.0))
        .collect();
    assert!(mean_abs[0] > mean_abs[1]);
    assert!(mean_abs[0] > mean_abs[2]);
}

#[test]
fn test_grid_search_over_time_folds() {
    let (x, y) = data(60);
    let folds = vec![
        Fold { train: 0..20, test: 20..40 },
        Fold { train: 0..40, test: 40..60 },
    ];
    let grid = GbtGrid {
        n_estimators: vec![1, 50],
        max_depth: vec![3],
        learning_rate: vec![0.1],
    };
    let result = grid
        .search(
            &GradientBoostingConfig::default(),
            Validation::Folds { x: &x, y: &y, folds: &folds },
            &GridSearch::new(),
        )
        .unwrap();

    assert_eq!(result.all.len(), 2);
    // A single shrunk tree barely moves away from the mean
    assert_eq!(result.best.params.n_estimators, 50);
    assert!(result.all[0].score > result.all[1].score);
}
