//! # Regression Tree
//!
//! CART regression tree with the squared-error criterion.
//!
//! Nodes live in a flat vector; node 0 is the root and every child index is
//! strictly greater than its parent's, so a tree is acyclic by construction.
//! Rows with `x[feature] <= threshold` go to the left child.

use crate::primitives::FEATURE_COUNT;
use crate::{FeatureVector, PickestError};
use serde::{Deserialize, Serialize};

/// A node of a fitted regression tree.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub enum TreeNode {
    /// Internal node: route on one feature.
    Split {
        /// Feature index in `FEATURE_COLUMNS` order.
        feature: usize,
        /// Rows with `x[feature] <= threshold` go left.
        threshold: f32,
        /// Index of the left child.
        left: usize,
        /// Index of the right child.
        right: usize,
    },
    /// Terminal node: mean target of the rows that reached it.
    Leaf {
        /// Predicted value.
        value: f64,
    },
}

/// Growth limits for a single tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TreeParams {
    /// Maximum depth (root is depth 0). `None` grows until leaves are pure.
    pub max_depth: Option<usize>,
    /// Minimum rows a node needs to be split.
    pub min_samples_split: usize,
    /// Minimum rows each child must receive.
    pub min_samples_leaf: usize,
}

/// A fitted regression tree.
#[derive(Debug, Clone, PartialEq)]
pub struct RegressionTree {
    nodes: Vec<TreeNode>,
}

/// A node waiting to be grown.
struct Pending {
    node: usize,
    samples: Vec<usize>,
    depth: usize,
}

/// Best split found for a node.
struct SplitCandidate {
    feature: usize,
    threshold: f32,
    score: f64,
}

impl RegressionTree {
    /// Grow a tree on the rows named by `samples`.
    ///
    /// `samples` may contain repeated indices (bootstrap draws); each
    /// occurrence counts as one row.
    pub fn fit(
        features: &[FeatureVector],
        targets: &[f32],
        samples: Vec<usize>,
        params: &TreeParams,
    ) -> Result<Self, PickestError> {
        if samples.is_empty() {
            return Err(PickestError::EmptyTrainingSet);
        }
        if features.len() != targets.len() || samples.iter().any(|&i| i >= targets.len()) {
            return Err(PickestError::InvalidInput(
                "sample index outside the training rows".to_string(),
            ));
        }

        let max_depth = params.max_depth.unwrap_or(usize::MAX);
        let mut nodes = vec![TreeNode::Leaf { value: 0.0 }];
        let mut stack = vec![Pending {
            node: 0,
            samples,
            depth: 0,
        }];

        while let Some(Pending {
            node,
            samples,
            depth,
        }) = stack.pop()
        {
            nodes[node] = TreeNode::Leaf {
                value: mean(targets, &samples),
            };

            let splittable = depth < max_depth
                && samples.len() >= params.min_samples_split
                && samples.len() >= 2 * params.min_samples_leaf
                && !is_pure(targets, &samples);
            if !splittable {
                continue;
            }

            let Some(best) = best_split(features, targets, &samples, params.min_samples_leaf)
            else {
                continue;
            };

            let (left, right): (Vec<usize>, Vec<usize>) = samples
                .into_iter()
                .partition(|&i| features[i][best.feature] <= best.threshold);
            if left.is_empty() || right.is_empty() {
                continue;
            }

            let left_id = nodes.len();
            let right_id = left_id + 1;
            nodes.push(TreeNode::Leaf { value: 0.0 });
            nodes.push(TreeNode::Leaf { value: 0.0 });
            nodes[node] = TreeNode::Split {
                feature: best.feature,
                threshold: best.threshold,
                left: left_id,
                right: right_id,
            };

            stack.push(Pending {
                node: right_id,
                samples: right,
                depth: depth + 1,
            });
            stack.push(Pending {
                node: left_id,
                samples: left,
                depth: depth + 1,
            });
        }

        Ok(Self { nodes })
    }

    /// Rebuild a tree from stored nodes, checking its structure.
    pub fn from_nodes(nodes: Vec<TreeNode>) -> Result<Self, PickestError> {
        if nodes.is_empty() {
            return Err(PickestError::DeserializationError(
                "tree has no nodes".to_string(),
            ));
        }
        for (idx, node) in nodes.iter().enumerate() {
            match *node {
                TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                } => {
                    if feature >= FEATURE_COUNT {
                        return Err(PickestError::DeserializationError(format!(
                            "node {} splits on unknown feature {}",
                            idx, feature
                        )));
                    }
                    if !threshold.is_finite() {
                        return Err(PickestError::DeserializationError(format!(
                            "node {} has a non-finite threshold",
                            idx
                        )));
                    }
                    if left <= idx || right <= idx || left >= nodes.len() || right >= nodes.len()
                    {
                        return Err(PickestError::DeserializationError(format!(
                            "node {} has invalid children ({}, {})",
                            idx, left, right
                        )));
                    }
                }
                TreeNode::Leaf { value } => {
                    if !value.is_finite() {
                        return Err(PickestError::DeserializationError(format!(
                            "leaf {} has a non-finite value",
                            idx
                        )));
                    }
                }
            }
        }
        Ok(Self { nodes })
    }

    /// Predict the target for one row.
    #[must_use]
    pub fn predict(&self, x: &FeatureVector) -> f64 {
        let mut idx = 0;
        loop {
            match self.nodes.get(idx) {
                Some(TreeNode::Split {
                    feature,
                    threshold,
                    left,
                    right,
                }) => {
                    idx = if x[*feature] <= *threshold {
                        *left
                    } else {
                        *right
                    };
                }
                Some(TreeNode::Leaf { value }) => return *value,
                None => return 0.0,
            }
        }
    }

    /// All nodes; index 0 is the root.
    #[must_use]
    pub fn nodes(&self) -> &[TreeNode] {
        &self.nodes
    }

    /// Number of leaves.
    #[must_use]
    pub fn leaf_count(&self) -> usize {
        self.nodes
            .iter()
            .filter(|n| matches!(n, TreeNode::Leaf { .. }))
            .count()
    }

    /// Length of the longest root-to-leaf path, in edges.
    #[must_use]
    pub fn depth(&self) -> usize {
        let mut depths = vec![0usize; self.nodes.len()];
        let mut max = 0;
        // Children always follow their parent, so one forward pass suffices.
        for (idx, node) in self.nodes.iter().enumerate() {
            if let TreeNode::Split { left, right, .. } = *node {
                let d = depths[idx] + 1;
                depths[left] = d;
                depths[right] = d;
                max = max.max(d);
            }
        }
        max
    }
}

// =============================================================================
// SPLIT SEARCH
// =============================================================================

fn mean(targets: &[f32], samples: &[usize]) -> f64 {
    let sum: f64 = samples.iter().map(|&i| f64::from(targets[i])).sum();
    sum / samples.len().max(1) as f64
}

fn is_pure(targets: &[f32], samples: &[usize]) -> bool {
    let Some(&first) = samples.first() else {
        return true;
    };
    samples.iter().all(|&i| targets[i] == targets[first])
}

/// Find the split that minimises the summed squared error of the children.
///
/// Minimising child SSE is the same as maximising
/// `sum_l^2 / n_l + sum_r^2 / n_r`, which needs only running sums.
/// Ties keep the first candidate (lowest feature, lowest threshold).
fn best_split(
    features: &[FeatureVector],
    targets: &[f32],
    samples: &[usize],
    min_samples_leaf: usize,
) -> Option<SplitCandidate> {
    let n = samples.len();
    let total: f64 = samples.iter().map(|&i| f64::from(targets[i])).sum();
    let mut order = samples.to_vec();
    let mut best: Option<SplitCandidate> = None;

    for feature in 0..FEATURE_COUNT {
        order.sort_by(|&a, &b| features[a][feature].total_cmp(&features[b][feature]));

        let mut left_sum = 0.0f64;
        for pos in 0..n - 1 {
            let here = order[pos];
            left_sum += f64::from(targets[here]);

            let left_n = pos + 1;
            let right_n = n - left_n;
            if left_n < min_samples_leaf || right_n < min_samples_leaf {
                continue;
            }

            let lo = features[here][feature];
            let hi = features[order[pos + 1]][feature];
            if lo >= hi {
                continue;
            }

            let right_sum = total - left_sum;
            let score = left_sum * left_sum / left_n as f64 + right_sum * right_sum / right_n as f64;
            if best.as_ref().is_none_or(|b| score > b.score) {
                best = Some(SplitCandidate {
                    feature,
                    threshold: midpoint(lo, hi),
                    score,
                });
            }
        }
    }

    best
}

/// Threshold between two adjacent distinct values, always in `[lo, hi)`.
fn midpoint(lo: f32, hi: f32) -> f32 {
    let mid = ((f64::from(lo) + f64::from(hi)) / 2.0) as f32;
    if mid >= hi || mid < lo { lo } else { mid }
}

// =============================================================================
// TESTS
// =============================================================================
