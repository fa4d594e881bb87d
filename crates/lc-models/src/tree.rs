//! Regression trees fitted to gradient statistics.
//!
//! Split scoring uses the second-order gain
//! `0.5 * [GL²/(HL+λ) + GR²/(HR+λ) - G²/(H+λ)]` and leaves take the weight
//! `-G / (H + λ)`. Missing values (NaN) always go to the left child.

use lc_types::FeatureMatrix;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub(crate) enum Node {
    Leaf {
        weight: f64,
    },
    Split {
        feature: usize,
        threshold: f64,
        left: Box<Node>,
        right: Box<Node>,
    },
}

impl Node {
    pub(crate) fn predict(&self, features: &FeatureMatrix, row: usize) -> f64 {
        let mut node = self;
        loop {
            match node {
                Node::Leaf { weight } => return *weight,
                Node::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    let value = features.value(row, *feature);
                    node = if value.is_nan() || value <= *threshold {
                        left
                    } else {
                        right
                    };
                }
            }
        }
    }

    #[cfg(test)]
    pub(crate) fn depth(&self) -> usize {
        match self {
            Node::Leaf { .. } => 0,
            Node::Split { left, right, .. } => 1 + left.depth().max(right.depth()),
        }
    }
}

/// Growth limits and regularisation for one tree.
#[derive(Debug, Clone, Copy)]
pub(crate) struct TreeConfig {
    pub max_depth: usize,
    pub min_child_weight: f64,
    pub lambda: f64,
    pub gamma: f64,
}

/// Gradient statistics of the rows being fitted, indexed by row.
pub(crate) struct Gradients<'a> {
    pub grad: &'a [f64],
    pub hess: &'a [f64],
}

#[derive(Debug, Clone, Copy)]
struct Split {
    feature: usize,
    threshold: f64,
    gain: f64,
}

fn leaf_weight(g: f64, h: f64, lambda: f64) -> f64 {
    -g / (h + lambda)
}

fn score(g: f64, h: f64, lambda: f64) -> f64 {
    g * g / (h + lambda)
}

pub(crate) fn build_tree(
    x: &FeatureMatrix,
    gradients: &Gradients<'_>,
    rows: &[usize],
    features: &[usize],
    depth: usize,
    config: &TreeConfig,
) -> Node {
    let g_sum: f64 = rows.iter().map(|&r| gradients.grad[r]).sum();
    let h_sum: f64 = rows.iter().map(|&r| gradients.hess[r]).sum();
    let weight = leaf_weight(g_sum, h_sum, config.lambda);

    if depth >= config.max_depth || rows.len() < 2 || h_sum < config.min_child_weight {
        return Node::Leaf { weight };
    }

    let best = features
        .par_iter()
        .filter_map(|&f| best_split_for_feature(x, gradients, rows, f, g_sum, h_sum, config))
        .max_by(|a, b| a.gain.total_cmp(&b.gain));

    let Some(split) = best.filter(|s| s.gain > config.gamma) else {
        return Node::Leaf { weight };
    };

    let (left_rows, right_rows): (Vec<usize>, Vec<usize>) = rows.iter().partition(|&&r| {
        let value = x.value(r, split.feature);
        value.is_nan() || value <= split.threshold
    });
    if left_rows.is_empty() || right_rows.is_empty() {
        return Node::Leaf { weight };
    }

    Node::Split {
        feature: split.feature,
        threshold: split.threshold,
        left: Box::new(build_tree(x, gradients, &left_rows, features, depth + 1, config)),
        right: Box::new(build_tree(x, gradients, &right_rows, features, depth + 1, config)),
    }
}

/// Exact greedy scan over the sorted values of one feature.
fn best_split_for_feature(
    x: &FeatureMatrix,
    gradients: &Gradients<'_>,
    rows: &[usize],
    feature: usize,
    g_total: f64,
    h_total: f64,
    config: &TreeConfig,
) -> Option<Split> {
    let column = x.column(feature);

    // missing values start on the left
    let mut g_left = 0.0;
    let mut h_left = 0.0;
    let mut present: Vec<(f64, usize)> = Vec::with_capacity(rows.len());
    for &r in rows {
        let value = column[r];
        if value.is_nan() {
            g_left += gradients.grad[r];
            h_left += gradients.hess[r];
        } else {
            present.push((value, r));
        }
    }
    present.sort_unstable_by(|a, b| a.0.total_cmp(&b.0));

    let lambda = config.lambda;
    let parent = score(g_total, h_total, lambda);
    let mut best: Option<Split> = None;

    for pos in 0..present.len().saturating_sub(1) {
        let (value, r) = present[pos];
        g_left += gradients.grad[r];
        h_left += gradients.hess[r];

        let next = present[pos + 1].0;
        if next - value < 1e-12 {
            continue;
        }
        let g_right = g_total - g_left;
        let h_right = h_total - h_left;
        if h_left < config.min_child_weight || h_right < config.min_child_weight {
            continue;
        }

        let gain = 0.5 * (score(g_left, h_left, lambda) + score(g_right, h_right, lambda) - parent);
        if best.map_or(true, |b| gain > b.gain) {
            best = Some(Split {
                feature,
                threshold: (value + next) / 2.0,
                gain,
            });
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(max_depth: usize) -> TreeConfig {
        TreeConfig {
            max_depth,
            min_child_weight: 1.0,
            lambda: 0.0,
            gamma: 0.0,
        }
    }

    #[test]
    fn step_function_is_split_at_the_gap() {
        let x = FeatureMatrix::new(vec!["x".into()], vec![vec![1.0, 2.0, 3.0, 10.0, 11.0, 12.0]])
            .unwrap();
        // squared error at prediction 0: grad = -y
        let grad = vec![-1.0, -1.0, -1.0, -5.0, -5.0, -5.0];
        let hess = vec![1.0; 6];
        let gradients = Gradients {
            grad: &grad,
            hess: &hess,
        };
        let rows: Vec<usize> = (0..6).collect();
        let tree = build_tree(&x, &gradients, &rows, &[0], 0, &config(1));

        match &tree {
            Node::Split { threshold, .. } => assert_eq!(*threshold, 6.5),
            other => panic!("expected a split, got {other:?}"),
        }
        assert_eq!(tree.predict(&x, 0), 1.0);
        assert_eq!(tree.predict(&x, 5), 5.0);
    }

    #[test]
    fn missing_values_go_left() {
        let x = FeatureMatrix::new(vec!["x".into()], vec![vec![f64::NAN, 1.0, 2.0, 8.0, 9.0]])
            .unwrap();
        let grad = vec![-1.0, -1.0, -1.0, -4.0, -4.0];
        let hess = vec![1.0; 5];
        let gradients = Gradients {
            grad: &grad,
            hess: &hess,
        };
        let rows: Vec<usize> = (0..5).collect();
        let tree = build_tree(&x, &gradients, &rows, &[0], 0, &config(1));
        assert_eq!(tree.predict(&x, 0), tree.predict(&x, 1));
        assert_ne!(tree.predict(&x, 0), tree.predict(&x, 4));
    }

    #[test]
    fn respects_max_depth_and_gamma() {
        let values: Vec<f64> = (0..32).map(|i| i as f64).collect();
        let grad: Vec<f64> = values.iter().map(|v| -v * v).collect();
        let hess = vec![1.0; 32];
        let x = FeatureMatrix::new(vec!["x".into()], vec![values]).unwrap();
        let gradients = Gradients {
            grad: &grad,
            hess: &hess,
        };
        let rows: Vec<usize> = (0..32).collect();

        assert!(build_tree(&x, &gradients, &rows, &[0], 0, &config(3)).depth() <= 3);

        let strict = TreeConfig {
            gamma: f64::MAX,
            ..config(3)
        };
        assert_eq!(build_tree(&x, &gradients, &rows, &[0], 0, &strict).depth(), 0);
    }
}
