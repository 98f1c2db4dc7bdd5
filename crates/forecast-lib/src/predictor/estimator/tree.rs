//! Least-squares regression trees used as boosting stages

use crate::predictor::features::{FeatureRow, NUM_FEATURES};
use serde::{Deserialize, Serialize};

/// Minimum impurity decrease for a split to be kept
const MIN_GAIN: f64 = 1e-12;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub(crate) enum Node {
    Split {
        feature: usize,
        threshold: f64,
        left: usize,
        right: usize,
    },
    Leaf {
        value: f64,
    },
}

/// Binary tree stored as a flat node list; node 0 is the root
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) struct RegressionTree {
    nodes: Vec<Node>,
}

impl RegressionTree {
    pub(crate) fn predict(&self, row: &FeatureRow) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if row[*feature] <= *threshold { *left } else { *right };
                }
                Some(Node::Leaf { value }) => return *value,
                None => return 0.0,
            }
        }
    }

    /// Structural check used after deserialization
    pub(crate) fn is_well_formed(&self) -> bool {
        !self.nodes.is_empty()
            && self.nodes.iter().enumerate().all(|(i, node)| match node {
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    *feature < NUM_FEATURES
                        && threshold.is_finite()
                        && *left > i
                        && *right > i
                        && *left < self.nodes.len()
                        && *right < self.nodes.len()
                }
                Node::Leaf { value } => value.is_finite(),
            })
    }

    #[cfg(test)]
    pub(crate) fn node_count(&self) -> usize {
        self.nodes.len()
    }
}

/// Per-feature sample orderings, computed once per training set and shared
/// by every tree of an ensemble
pub(crate) struct SortedColumns {
    columns: Vec<Vec<usize>>,
}

impl SortedColumns {
    pub(crate) fn new(features: &[FeatureRow]) -> Self {
        let columns = (0..NUM_FEATURES)
            .map(|f| {
                let mut idx: Vec<usize> = (0..features.len()).collect();
                idx.sort_by(|&a, &b| features[a][f].total_cmp(&features[b][f]));
                idx
            })
            .collect();
        Self { columns }
    }
}

/// Growth limits for a single tree
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeLimits {
    pub max_depth: usize,
    pub min_samples_split: usize,
    pub min_samples_leaf: usize,
}

struct BestSplit {
    feature: usize,
    threshold: f64,
    gain: f64,
}

/// Grows one tree against a target vector (boosting residuals)
pub(crate) struct TreeBuilder<'a> {
    features: &'a [FeatureRow],
    targets: &'a [f64],
    limits: TreeLimits,
    nodes: Vec<Node>,
    goes_left: Vec<bool>,
}

impl<'a> TreeBuilder<'a> {
    pub(crate) fn new(features: &'a [FeatureRow], targets: &'a [f64], limits: TreeLimits) -> Self {
        Self {
            features,
            targets,
            limits,
            nodes: Vec::new(),
            goes_left: vec![false; features.len()],
        }
    }

    pub(crate) fn build(mut self, sorted: &SortedColumns) -> RegressionTree {
        self.grow(sorted.columns.clone(), 0);
        RegressionTree { nodes: self.nodes }
    }

    /// Grow the subtree for the samples in `columns` (each column holds the
    /// same sample set ordered by that feature) and return its node index
    fn grow(&mut self, columns: Vec<Vec<usize>>, depth: usize) -> usize {
        let samples = &columns[0];
        let n = samples.len();
        let sum: f64 = samples.iter().map(|&i| self.targets[i]).sum();
        let mean = if n == 0 { 0.0 } else { sum / n as f64 };

        let node_idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value: mean });

        if depth >= self.limits.max_depth
            || n < self.limits.min_samples_split
            || n < 2 * self.limits.min_samples_leaf
        {
            return node_idx;
        }

        let Some(best) = self.best_split(&columns, sum) else {
            return node_idx;
        };

        for &i in samples {
            self.goes_left[i] = self.features[i][best.feature] <= best.threshold;
        }
        let mut left_columns = Vec::with_capacity(NUM_FEATURES);
        let mut right_columns = Vec::with_capacity(NUM_FEATURES);
        for column in columns {
            let (l, r): (Vec<usize>, Vec<usize>) =
                column.into_iter().partition(|&i| self.goes_left[i]);
            left_columns.push(l);
            right_columns.push(r);
        }

        let left = self.grow(left_columns, depth + 1);
        let right = self.grow(right_columns, depth + 1);
        self.nodes[node_idx] = Node::Split {
            feature: best.feature,
            threshold: best.threshold,
            left,
            right,
        };
        node_idx
    }

    fn best_split(&self, columns: &[Vec<usize>], total: f64) -> Option<BestSplit> {
        let n = columns[0].len();
        let min_leaf = self.limits.min_samples_leaf.max(1);
        let parent_score = total * total / n as f64;
        let mut best: Option<BestSplit> = None;

        for (feature, order) in columns.iter().enumerate() {
            let mut left_sum = 0.0;
            for pos in 0..n - 1 {
                let i = order[pos];
                left_sum += self.targets[i];
                let left_n = pos + 1;
                let right_n = n - left_n;
                if left_n < min_leaf || right_n < min_leaf {
                    continue;
                }
                let value = self.features[i][feature];
                let next = self.features[order[pos + 1]][feature];
                if next <= value {
                    continue;
                }
                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / left_n as f64
                    + right_sum * right_sum / right_n as f64
                    - parent_score;
                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    let mut threshold = value + (next - value) / 2.0;
                    if threshold >= next {
                        threshold = value;
                    }
                    best = Some(BestSplit {
                        feature,
                        threshold,
                        gain,
                    });
                }
            }
        }
        best
    }
}
