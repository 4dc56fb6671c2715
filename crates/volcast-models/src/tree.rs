//! CART regression tree.
//!
//! Splits minimize the summed squared error of the two children. Candidate
//! thresholds are midpoints between consecutive distinct feature values, and
//! a row goes left when `x[feature] <= threshold`.

use crate::error::{ModelError, Result};
use crate::parallel::map_slice;
use crate::regressor::{Regressor, TreeAttribution, check_features, check_training_data};
use ndarray::{Array1, Array2, ArrayView1};
use serde::{Deserialize, Serialize};

/// Tree growth limits.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TreeConfig {
    /// Maximum depth; 0 grows a single leaf (default: 4)
    pub max_depth: usize,
    /// Minimum rows in each child (default: 1)
    pub min_samples_leaf: usize,
    /// Minimum rows for a node to be split (default: 2)
    pub min_samples_split: usize,
}

impl Default for TreeConfig {
    fn default() -> Self {
        Self {
            max_depth: 4,
            min_samples_leaf: 1,
            min_samples_split: 2,
        }
    }
}

impl TreeConfig {
    /// Check the growth limits.
    pub fn validate(&self) -> Result<()> {
        if self.min_samples_leaf == 0 {
            return Err(ModelError::Config(
                "min_samples_leaf must be at least 1".to_string(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(ModelError::Config(
                "min_samples_split must be at least 2".to_string(),
            ));
        }
        Ok(())
    }
}

/// Tree node. Every node keeps the mean target of the rows that reached it.
#[derive(Debug, Clone, Serialize, Deserialize)]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
        value: f64,
    },
}

impl Node {
    const fn value(&self) -> f64 {
        match self {
            Self::Leaf { value } | Self::Split { value, .. } => *value,
        }
    }
}

#[derive(Debug, Clone, Copy)]
struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Regression tree with squared-error splits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RegressionTree {
    config: TreeConfig,
    nodes: Vec<Node>,
    root: Option<usize>,
    n_features: usize,
    importances: Vec<f64>,
    force_sequential: bool,
}

impl Default for RegressionTree {
    fn default() -> Self {
        Self::new(TreeConfig::default())
    }
}

impl RegressionTree {
    /// Create an unfitted tree.
    pub const fn new(config: TreeConfig) -> Self {
        Self {
            config,
            nodes: Vec::new(),
            root: None,
            n_features: 0,
            importances: Vec::new(),
            force_sequential: false,
        }
    }

    /// Scan split candidates sequentially even with the `parallel` feature.
    pub const fn with_force_sequential(mut self, force_sequential: bool) -> Self {
        self.force_sequential = force_sequential;
        self
    }

    /// Get the configuration.
    pub const fn config(&self) -> &TreeConfig {
        &self.config
    }

    /// Number of nodes in the fitted tree.
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Total squared-error reduction attributed to each feature.
    pub fn split_gains(&self) -> &[f64] {
        &self.importances
    }

    /// Mean target of the training rows (the root value).
    pub fn root_value(&self) -> Result<f64> {
        let root = self.root.ok_or(ModelError::NotFitted)?;
        Ok(self.nodes[root].value())
    }

    fn build(&mut self, x: &Array2<f64>, y: &Array1<f64>, rows: &[usize], depth: usize) -> usize {
        let n = rows.len();
        let value = rows.iter().map(|&r| y[r]).sum::<f64>() / n as f64;

        let split = if depth >= self.config.max_depth || n < self.config.min_samples_split {
            None
        } else {
            self.find_best_split(x, y, rows)
        };

        let Some(split) = split else {
            self.nodes.push(Node::Leaf { value });
            return self.nodes.len() - 1;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| x[[r, split.feature]] <= split.threshold);

        self.importances[split.feature] += split.gain;
        let left = self.build(x, y, &left_rows, depth + 1);
        let right = self.build(x, y, &right_rows, depth + 1);

        self.nodes.push(Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
            value,
        });
        self.nodes.len() - 1
    }

    fn find_best_split(&self, x: &Array2<f64>, y: &Array1<f64>, rows: &[usize]) -> Option<BestSplit> {
        let n = rows.len() as f64;
        let total: f64 = rows.iter().map(|&r| y[r]).sum();
        let total_sq: f64 = rows.iter().map(|&r| y[r] * y[r]).sum();
        let parent_sse = total_sq - total * total / n;
        if parent_sse <= 1e-12 {
            return None;
        }

        let min_leaf = self.config.min_samples_leaf;
        let features: Vec<usize> = (0..x.ncols()).collect();

        let candidates = map_slice(
            &features,
            |&feature| {
                let mut pairs: Vec<(f64, f64)> =
                    rows.iter().map(|&r| (x[[r, feature]], y[r])).collect();
                pairs.sort_by(|a, b| a.0.total_cmp(&b.0));

                let mut best: Option<BestSplit> = None;
                let mut left_sum = 0.0;
                let mut left_sq = 0.0;
                for i in 0..pairs.len() - 1 {
                    let (value, target) = pairs[i];
                    left_sum += target;
                    left_sq += target * target;

                    let next = pairs[i + 1].0;
                    if value == next {
                        continue;
                    }
                    let left_n = (i + 1) as f64;
                    let right_n = n - left_n;
                    if i + 1 < min_leaf || pairs.len() - i - 1 < min_leaf {
                        continue;
                    }

                    let right_sum = total - left_sum;
                    let right_sq = total_sq - left_sq;
                    let child_sse = (left_sq - left_sum * left_sum / left_n)
                        + (right_sq - right_sum * right_sum / right_n);
                    let gain = parent_sse - child_sse;

                    if gain > best.map_or(0.0, |b| b.gain) {
                        best = Some(BestSplit {
                            feature,
                            threshold: (value + next) / 2.0,
                            gain,
                        });
                    }
                }
                best
            },
            self.force_sequential,
        );

        // Ties go to the lowest feature index
        candidates
            .into_iter()
            .flatten()
            .fold(None, |best: Option<BestSplit>, c| match best {
                Some(b) if b.gain >= c.gain => Some(b),
                _ => Some(c),
            })
    }

    fn leaf_path(&self, row: ArrayView1<'_, f64>, mut visit: impl FnMut(usize, usize)) -> Result<f64> {
        let mut current = self.root.ok_or(ModelError::NotFitted)?;
        loop {
            match &self.nodes[current] {
                Node::Leaf { value } => return Ok(*value),
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                    ..
                } => {
                    let next = if row[*feature] <= *threshold { *left } else { *right };
                    visit(current, next);
                    current = next;
                }
            }
        }
    }
}

impl Regressor for RegressionTree {
    fn name(&self) -> &str {
        "regression_tree"
    }

    fn fit(&mut self, x: &Array2<f64>, y: &Array1<f64>) -> Result<()> {
        self.config.validate()?;
        check_training_data(x, y)?;

        self.nodes.clear();
        self.n_features = x.ncols();
        self.importances = vec![0.0; x.ncols()];
        let rows: Vec<usize> = (0..x.nrows()).collect();
        let root = self.build(x, y, &rows, 0);
        self.root = Some(root);
        Ok(())
    }

    fn predict(&self, x: &Array2<f64>) -> Result<Array1<f64>> {
        if !self.is_fitted() {
            return Err(ModelError::NotFitted);
        }
        check_features(x, self.n_features)?;
        x.rows()
            .into_iter()
            .map(|row| self.leaf_path(row, |_, _| {}))
            .collect::<Result<Vec<_>>>()
            .map(Array1::from_vec)
    }

    fn is_fitted(&self) -> bool {
        self.root.is_some()
    }
}

impl TreeAttribution for RegressionTree {
    /// Path decomposition: each split on the way to the leaf credits its
    /// feature with the change in node mean.
    fn attributions(&self, x: &Array2<f64>) -> Result<Array2<f64>> {
        if !self.is_fitted() {
            return Err(ModelError::NotFitted);
        }
        check_features(x, self.n_features)?;

        let mut out = Array2::zeros(x.raw_dim());
        for (i, row) in x.rows().into_iter().enumerate() {
            let mut contributions = out.row_mut(i);
            self.leaf_path(row, |from, to| {
                if let Node::Split { feature, .. } = &self.nodes[from] {
                    contributions[*feature] += self.nodes[to].value() - self.nodes[from].value();
                }
            })?;
        }
        Ok(out)
    }

    fn expected_value(&self) -> Result<f64> {
        self.root_value()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use ndarray::array;

    fn step_data() -> (Array2<f64>, Array1<f64>) {
        let x = array![[1.0, 5.0], [2.0, 3.0], [3.0, 9.0], [4.0, 1.0], [5.0, 7.0], [6.0, 2.0]];
        let y = array![1.0, 1.0, 1.0, 10.0, 10.0, 10.0];
        (x, y)
    }

    #[test]
    fn test_tree_learns_step() {
        let (x, y) = step_data();
        let mut tree = RegressionTree::default();
        tree.fit(&x, &y).unwrap();
        let pred = tree.predict(&x).unwrap();
        for (p, t) in pred.iter().zip(y.iter()) {
            assert_relative_eq!(*p, *t, epsilon = 1e-12);
        }
        // One split on the first feature, two leaves
        assert_eq!(tree.node_count(), 3);
        assert!(tree.split_gains()[0] > 0.0);
        assert_eq!(tree.split_gains()[1], 0.0);
    }

    #[test]
    fn test_max_depth_zero_is_mean() {
        let (x, y) = step_data();
        let mut tree = RegressionTree::new(TreeConfig {
            max_depth: 0,
            ..Default::default()
        });
        tree.fit(&x, &y).unwrap();
        assert_relative_eq!(tree.predict(&x).unwrap()[0], 5.5, epsilon = 1e-12);
    }

    #[test]
    fn test_attributions_are_additive() {
        let x = array![[1.0, 0.0], [1.0, 1.0], [2.0, 0.0], [2.0, 1.0], [3.0, 0.5]];
        let y = array![1.0, 3.0, 5.0, 9.0, 4.0];
        let mut tree = RegressionTree::default().with_force_sequential(true);
        tree.fit(&x, &y).unwrap();

        let attributions = tree.attributions(&x).unwrap();
        let pred = tree.predict(&x).unwrap();
        let base = tree.expected_value().unwrap();
        assert_relative_eq!(base, 4.4, epsilon = 1e-12);
        for i in 0..x.nrows() {
            assert_relative_eq!(base + attributions.row(i).sum(), pred[i], epsilon = 1e-9);
        }
    }

    #[test]
    fn test_min_samples_leaf_respected() {
        let (x, y) = step_data();
        let mut tree = RegressionTree::new(TreeConfig {
            min_samples_leaf: 4,
            ..Default::default()
        });
        tree.fit(&x, &y).unwrap();
        assert_eq!(tree.node_count(), 1);
    }

    #[test]
    fn test_errors() {
        let tree = RegressionTree::default();
        assert!(matches!(
            tree.predict(&array![[1.0]]),
            Err(ModelError::NotFitted)
        ));

        let (x, y) = step_data();
        let mut tree = RegressionTree::default();
        tree.fit(&x, &y).unwrap();
        assert!(matches!(
            tree.predict(&array![[1.0]]),
            Err(ModelError::Shape { .. })
        ));

        let mut tree = RegressionTree::default();
        assert!(tree.fit(&x, &array![1.0]).is_err());
        assert!(tree.fit(&array![[f64::NAN]], &array![1.0]).is_err());
    }
}
