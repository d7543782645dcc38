//! Exact path-dependent TreeSHAP for a single regression tree.
//!
//! Follows the polynomial-time algorithm of Lundberg et al.: walk every root→leaf
//! path once, maintaining for each distinct feature on the path the proportion of
//! "zero" paths (feature missing, split by cover) and "one" paths (feature present,
//! follows `x`). At each leaf the unwound path weights give every feature's share of
//! the leaf value. The per-tree attributions sum to `tree(x) - E[tree]`, where the
//! expectation is cover-weighted.

use crate::models::tree::{Node, RegressionTree};

#[derive(Debug, Clone, Copy)]
struct PathElement {
    feature: Option<usize>,
    zero: f64,
    one: f64,
    weight: f64,
}

/// Node covers derived from background rows routed through the tree.
///
/// Every leaf gets a pseudo-count of one plus its background hits, so all covers
/// are positive; an internal node's cover is the sum of its children.
pub fn node_covers(tree: &RegressionTree, background: &[Vec<f64>]) -> Vec<f64> {
    let nodes = tree.nodes();
    let mut covers = vec![0.0; nodes.len()];
    for (idx, node) in nodes.iter().enumerate() {
        if matches!(node, Node::Leaf { .. }) {
            covers[idx] = 1.0;
        }
    }
    for row in background {
        covers[tree.leaf_index(row)] += 1.0;
    }
    fill_internal(nodes, 0, &mut covers);
    covers
}

fn fill_internal(nodes: &[Node], idx: usize, covers: &mut [f64]) -> f64 {
    match nodes[idx] {
        Node::Leaf { .. } => covers[idx],
        Node::Split { left, right, .. } => {
            let total = fill_internal(nodes, left, covers) + fill_internal(nodes, right, covers);
            covers[idx] = total;
            total
        }
    }
}

/// Cover-weighted mean leaf value.
pub fn expected_value(tree: &RegressionTree, covers: &[f64]) -> f64 {
    let root = covers[0];
    tree.nodes()
        .iter()
        .zip(covers)
        .filter_map(|(node, cover)| match node {
            Node::Leaf { value } => Some(value * cover / root),
            Node::Split { .. } => None,
        })
        .sum()
}

/// Add this tree's SHAP values for `x` into `phi`.
pub fn tree_shap(tree: &RegressionTree, covers: &[f64], x: &[f64], phi: &mut [f64]) {
    let walker = Walker { tree, covers, x };
    walker.recurse(0, Vec::new(), 1.0, 1.0, None, phi);
}

struct Walker<'a> {
    tree: &'a RegressionTree,
    covers: &'a [f64],
    x: &'a [f64],
}

impl Walker<'_> {
    fn recurse(
        &self,
        node: usize,
        mut path: Vec<PathElement>,
        zero: f64,
        one: f64,
        feature: Option<usize>,
        phi: &mut [f64],
    ) {
        extend(&mut path, zero, one, feature);

        match self.tree.nodes()[node] {
            Node::Leaf { value } => {
                for i in 1..path.len() {
                    let w = unwound_sum(&path, i);
                    let el = path[i];
                    if let Some(f) = el.feature {
                        phi[f] += w * (el.one - el.zero) * value;
                    }
                }
            }
            Node::Split {
                feature: split_feature,
                threshold,
                left,
                right,
            } => {
                let (hot, cold) = if self.x[split_feature] <= threshold {
                    (left, right)
                } else {
                    (right, left)
                };
                let cover = self.covers[node];
                let hot_zero = self.covers[hot] / cover;
                let cold_zero = self.covers[cold] / cover;

                let mut incoming_zero = 1.0;
                let mut incoming_one = 1.0;
                if let Some(k) = (1..path.len()).find(|&k| path[k].feature == Some(split_feature)) {
                    incoming_zero = path[k].zero;
                    incoming_one = path[k].one;
                    unwind(&mut path, k);
                }

                self.recurse(
                    hot,
                    path.clone(),
                    hot_zero * incoming_zero,
                    incoming_one,
                    Some(split_feature),
                    phi,
                );
                self.recurse(
                    cold,
                    path,
                    cold_zero * incoming_zero,
                    0.0,
                    Some(split_feature),
                    phi,
                );
            }
        }
    }
}

fn extend(path: &mut Vec<PathElement>, zero: f64, one: f64, feature: Option<usize>) {
    let depth = path.len();
    path.push(PathElement {
        feature,
        zero,
        one,
        weight: if depth == 0 { 1.0 } else { 0.0 },
    });
    let denom = (depth + 1) as f64;
    for i in (0..depth).rev() {
        path[i + 1].weight += one * path[i].weight * (i + 1) as f64 / denom;
        path[i].weight = zero * path[i].weight * (depth - i) as f64 / denom;
    }
}

fn unwind(path: &mut Vec<PathElement>, k: usize) {
    let depth = path.len() - 1;
    let one = path[k].one;
    let zero = path[k].zero;
    let denom = (depth + 1) as f64;
    let mut next = path[depth].weight;

    for i in (0..depth).rev() {
        if one != 0.0 {
            let tmp = path[i].weight;
            path[i].weight = next * denom / ((i + 1) as f64 * one);
            next = tmp - path[i].weight * zero * (depth - i) as f64 / denom;
        } else {
            path[i].weight = path[i].weight * denom / (zero * (depth - i) as f64);
        }
    }

    for i in k..depth {
        path[i].feature = path[i + 1].feature;
        path[i].zero = path[i + 1].zero;
        path[i].one = path[i + 1].one;
    }
    path.pop();
}

/// Total path weight with element `k` removed, without mutating the path.
fn unwound_sum(path: &[PathElement], k: usize) -> f64 {
    let depth = path.len() - 1;
    let one = path[k].one;
    let zero = path[k].zero;
    let denom = (depth + 1) as f64;
    let mut next = path[depth].weight;
    let mut total = 0.0;

    for i in (0..depth).rev() {
        if one != 0.0 {
            let tmp = next * denom / ((i + 1) as f64 * one);
            total += tmp;
            next = path[i].weight - tmp * zero * (depth - i) as f64 / denom;
        } else if zero != 0.0 {
            total += path[i].weight / zero / ((depth - i) as f64 / denom);
        }
    }
    total
}
