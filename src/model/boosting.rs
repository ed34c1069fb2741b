//! Least-squares gradient boosting over CART regression trees.
//!
//! Each stage fits a depth-limited tree to the current residuals and adds
//! `learning_rate` times its prediction to the ensemble. The seed only
//! decides the order candidate features are scanned in, which settles
//! ties between equally good splits.

use ndarray::{Array1, ArrayView1, ArrayView2};
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use serde::{Deserialize, Serialize};

use super::FitError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoostingParams {
    pub n_estimators: usize,
    pub learning_rate: f64,
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
    pub random_state: u64,
}

impl Default for BoostingParams {
    fn default() -> Self {
        Self {
            n_estimators: 100,
            learning_rate: 0.1,
            max_depth: 5,
            min_samples_split: 5,
            min_samples_leaf: 2,
            random_state: 42,
        }
    }
}

impl BoostingParams {
    /// Hyperparameters as registry params.
    pub fn as_params(&self) -> Vec<(String, String)> {
        vec![
            ("n_estimators".into(), self.n_estimators.to_string()),
            ("learning_rate".into(), self.learning_rate.to_string()),
            ("max_depth".into(), self.max_depth.to_string()),
            ("min_samples_split".into(), self.min_samples_split.to_string()),
            ("min_samples_leaf".into(), self.min_samples_leaf.to_string()),
            ("random_state".into(), self.random_state.to_string()),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "node", rename_all = "snake_case")]
enum Node {
    Leaf {
        value: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    fn predict_row(&self, row: ArrayView1<f64>) -> f64 {
        let mut idx = 0;
        loop {
            match &self.nodes[idx] {
                Node::Leaf { value } => return *value,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
            }
        }
    }

    /// Largest feature index any split reads, if the tree splits at all.
    fn max_feature(&self) -> Option<usize> {
        self.nodes
            .iter()
            .filter_map(|node| match node {
                Node::Split { feature, .. } => Some(*feature),
                Node::Leaf { .. } => None,
            })
            .max()
    }

    /// Child links point forward and inside the node table.
    fn is_well_formed(&self) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(i, node)| match node {
                Node::Leaf { .. } => true,
                Node::Split { left, right, .. } => {
                    *left > i && *right > i && *left < self.nodes.len() && *right < self.nodes.len()
                }
            })
    }
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

struct TreeBuilder<'x, 'a> {
    x: ArrayView2<'x, f64>,
    residuals: &'a [f64],
    params: &'a BoostingParams,
    nodes: Vec<Node>,
    importances: Vec<f64>,
}

impl TreeBuilder<'_, '_> {
    fn grow(&mut self, samples: Vec<usize>, depth: usize, rng: &mut ChaCha8Rng) -> usize {
        let value = samples.iter().map(|&i| self.residuals[i]).sum::<f64>() / samples.len() as f64;
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value });

        if depth >= self.params.max_depth
            || samples.len() < self.params.min_samples_split
            || samples.len() < 2 * self.params.min_samples_leaf
        {
            return idx;
        }

        let Some(split) = self.best_split(&samples, rng) else {
            return idx;
        };

        let (left, right): (Vec<usize>, Vec<usize>) = samples
            .iter()
            .partition(|&&i| self.x[[i, split.feature]] <= split.threshold);
        self.importances[split.feature] += split.gain;

        let left = self.grow(left, depth + 1, rng);
        let right = self.grow(right, depth + 1, rng);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }

    /// Split with the largest squared-error reduction that leaves at least
    /// `min_samples_leaf` rows on each side.
    fn best_split(&self, samples: &[usize], rng: &mut ChaCha8Rng) -> Option<SplitCandidate> {
        let n = samples.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let total: f64 = samples.iter().map(|&i| self.residuals[i]).sum();
        let parent_score = total * total / n as f64;

        let mut features: Vec<usize> = (0..self.x.ncols()).collect();
        features.shuffle(rng);

        let mut best: Option<SplitCandidate> = None;
        let mut column: Vec<(f64, f64)> = Vec::with_capacity(n);

        for feature in features {
            column.clear();
            column.extend(samples.iter().map(|&i| (self.x[[i, feature]], self.residuals[i])));
            column.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_sum = 0.0;
            for k in 1..n {
                left_sum += column[k - 1].1;
                if k < min_leaf || n - k < min_leaf {
                    continue;
                }
                let (lo, hi) = (column[k - 1].0, column[k].0);
                if lo >= hi {
                    continue;
                }

                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / k as f64 + right_sum * right_sum / (n - k) as f64
                    - parent_score;
                if gain > 1e-12 && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let mid = lo + (hi - lo) / 2.0;
                    best = Some(SplitCandidate {
                        feature,
                        threshold: if mid < hi { mid } else { lo },
                        gain,
                    });
                }
            }
        }
        best
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GradientBoosting {
    pub params: BoostingParams,
    n_features: usize,
    init: f64,
    trees: Vec<RegressionTree>,
    feature_importances: Vec<f64>,
}

impl GradientBoosting {
    pub fn fit(x: ArrayView2<f64>, y: ArrayView1<f64>, params: BoostingParams) -> Result<Self, FitError> {
        let (n, p) = x.dim();
        if n == 0 {
            return Err(FitError::EmptyTrainingSet);
        }
        if y.len() != n {
            return Err(FitError::ShapeMismatch { rows: n, targets: y.len() });
        }

        let init = y.sum() / n as f64;
        let mut current = vec![init; n];
        let mut residuals = vec![0.0; n];
        let mut trees = Vec::with_capacity(params.n_estimators);
        let mut importances = vec![0.0; p];
        let mut rng = ChaCha8Rng::seed_from_u64(params.random_state);

        for stage in 0..params.n_estimators {
            for i in 0..n {
                residuals[i] = y[i] - current[i];
            }

            let mut builder = TreeBuilder {
                x,
                residuals: &residuals,
                params: &params,
                nodes: Vec::new(),
                importances: vec![0.0; p],
            };
            builder.grow((0..n).collect(), 0, &mut rng);

            // per-tree normalisation, then averaged over the ensemble
            let tree_total: f64 = builder.importances.iter().sum();
            if tree_total > 0.0 {
                for (acc, imp) in importances.iter_mut().zip(&builder.importances) {
                    *acc += imp / tree_total;
                }
            }

            let tree = RegressionTree { nodes: builder.nodes };
            for (i, row) in x.outer_iter().enumerate() {
                current[i] += params.learning_rate * tree.predict_row(row);
            }
            tracing::trace!(stage, nodes = tree.nodes.len(), "boosting stage fitted");
            trees.push(tree);
        }

        let total: f64 = importances.iter().sum();
        if total > 0.0 {
            importances.iter_mut().for_each(|v| *v /= total);
        }

        Ok(Self {
            params,
            n_features: p,
            init,
            trees,
            feature_importances: importances,
        })
    }

    pub fn predict(&self, x: ArrayView2<f64>) -> Array1<f64> {
        x.outer_iter()
            .map(|row| {
                self.init
                    + self.params.learning_rate
                        * self.trees.iter().map(|tree| tree.predict_row(row)).sum::<f64>()
            })
            .collect()
    }

    /// Normalised impurity-decrease importance per feature column.
    pub fn feature_importances(&self) -> &[f64] {
        &self.feature_importances
    }

    pub fn n_features(&self) -> usize {
        self.n_features
    }

    pub(crate) fn is_consistent(&self) -> bool {
        self.feature_importances.len() == self.n_features
            && self.trees.iter().all(|tree| {
                tree.is_well_formed() && tree.max_feature().map_or(true, |f| f < self.n_features)
            })
    }
}

/// Pair feature names with importances, most important first.
pub fn rank_features(names: &[String], importances: &[f64]) -> Vec<(String, f64)> {
    let mut ranked: Vec<(String, f64)> = names.iter().cloned().zip(importances.iter().copied()).collect();
    ranked.sort_by(|a, b| b.1.total_cmp(&a.1));
    ranked
}
