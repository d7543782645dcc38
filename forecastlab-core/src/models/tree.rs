//! CART regression trees for gradient boosting.
//!
//! Trees are stored as a flat arena of nodes (root at index 0). A row goes left
//! when `x[feature] <= threshold`. Splits maximize the reduction in squared error;
//! leaves hold the mean of their residuals.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Node {
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

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RegressionTree {
    nodes: Vec<Node>,
}

#[derive(Debug, Clone, Copy)]
pub struct TreeParams {
    pub max_depth: usize,
    pub min_samples_leaf: usize,
}

/// Minimum squared-error reduction for a split to be kept.
const MIN_GAIN: f64 = 1e-12;

impl RegressionTree {
    /// Fit a tree on the given `rows` of `x`, considering only `features`.
    pub fn fit(
        x: &[Vec<f64>],
        targets: &[f64],
        rows: &[usize],
        features: &[usize],
        params: TreeParams,
    ) -> Self {
        let mut builder = Builder {
            x,
            targets,
            features,
            params,
            nodes: Vec::new(),
        };
        builder.grow(rows.to_vec(), 0);
        Self {
            nodes: builder.nodes,
        }
    }

    /// Single-leaf tree.
    pub fn constant(value: f64) -> Self {
        Self {
            nodes: vec![Node::Leaf { value }],
        }
    }

    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn predict(&self, row: &[f64]) -> f64 {
        let leaf = self.leaf_index(row);
        match self.nodes[leaf] {
            Node::Leaf { value } => value,
            Node::Split { .. } => unreachable!("leaf_index always ends on a leaf"),
        }
    }

    /// Index of the leaf `row` falls into.
    pub fn leaf_index(&self, row: &[f64]) -> usize {
        let mut idx = 0;
        while let Node::Split {
            feature,
            threshold,
            left,
            right,
        } = self.nodes[idx]
        {
            idx = if row[feature] <= threshold { left } else { right };
        }
        idx
    }

    pub fn depth(&self) -> usize {
        fn walk(nodes: &[Node], idx: usize) -> usize {
            match nodes[idx] {
                Node::Leaf { .. } => 0,
                Node::Split { left, right, .. } => 1 + walk(nodes, left).max(walk(nodes, right)),
            }
        }
        walk(&self.nodes, 0)
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, Node::Leaf { .. }))
            .count()
    }
}

struct Builder<'a> {
    x: &'a [Vec<f64>],
    targets: &'a [f64],
    features: &'a [usize],
    params: TreeParams,
    nodes: Vec<Node>,
}

struct SplitCandidate {
    feature: usize,
    threshold: f64,
    gain: f64,
}

impl Builder<'_> {
    fn grow(&mut self, rows: Vec<usize>, depth: usize) -> usize {
        let sum: f64 = rows.iter().map(|&r| self.targets[r]).sum();
        let mean = if rows.is_empty() {
            0.0
        } else {
            sum / rows.len() as f64
        };
        let idx = self.nodes.len();
        self.nodes.push(Node::Leaf { value: mean });

        if depth >= self.params.max_depth || rows.len() < 2 * self.params.min_samples_leaf.max(1) {
            return idx;
        }
        let Some(split) = self.best_split(&rows, sum) else {
            return idx;
        };

        let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows
            .iter()
            .partition(|&&r| self.x[r][split.feature] <= split.threshold);
        let left = self.grow(left_rows, depth + 1);
        let right = self.grow(right_rows, depth + 1);
        self.nodes[idx] = Node::Split {
            feature: split.feature,
            threshold: split.threshold,
            left,
            right,
        };
        idx
    }

    fn best_split(&self, rows: &[usize], total: f64) -> Option<SplitCandidate> {
        let n = rows.len();
        let min_leaf = self.params.min_samples_leaf.max(1);
        let parent_score = total * total / n as f64;
        let mut best: Option<SplitCandidate> = None;

        let mut sorted: Vec<(f64, f64)> = Vec::with_capacity(n);
        for &feature in self.features {
            sorted.clear();
            sorted.extend(rows.iter().map(|&r| (self.x[r][feature], self.targets[r])));
            sorted.sort_by(|a, b| a.0.total_cmp(&b.0));

            let mut left_sum = 0.0;
            for i in 0..n - 1 {
                left_sum += sorted[i].1;
                let left_n = i + 1;
                let right_n = n - left_n;
                if left_n < min_leaf || right_n < min_leaf {
                    continue;
                }
                // No threshold separates equal values.
                if sorted[i].0 == sorted[i + 1].0 {
                    continue;
                }
                let right_sum = total - left_sum;
                let gain = left_sum * left_sum / left_n as f64
                    + right_sum * right_sum / right_n as f64
                    - parent_score;
                if gain > MIN_GAIN && best.as_ref().map_or(true, |b| gain > b.gain) {
                    best = Some(SplitCandidate {
                        feature,
                        threshold: (sorted[i].0 + sorted[i + 1].0) / 2.0,
                        gain,
                    });
                }
            }
        }

        best
    }
}
