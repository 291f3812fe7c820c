//! # Forest Module
//!
//! Random forest regressor: bootstrap-aggregated CART trees, averaged.
//!
//! Every tree draws its own seed from a `StdRng` seeded with
//! `ForestParams::seed`, so the same training rows and parameters always
//! produce the same forest. Training is single-threaded.

mod tree;

pub use tree::{RegressionTree, TreeNode, TreeParams};

use crate::dataset::Dataset;
use crate::primitives::{DEFAULT_N_ESTIMATORS, DEFAULT_SEED, MAX_ESTIMATORS};
use crate::{FeatureVector, PickestError};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use std::time::Instant;

// =============================================================================
// PARAMETERS
// =============================================================================

/// Hyperparameters of the forest.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ForestParams {
    /// Number of trees.
    pub n_estimators: usize,
    /// Maximum tree depth; `None` grows until leaves are pure.
    pub max_depth: Option<usize>,
    /// Minimum rows a node needs to be split.
    pub min_samples_split: usize,
    /// Minimum rows each child must receive.
    pub min_samples_leaf: usize,
    /// Draw each tree's rows with replacement.
    pub bootstrap: bool,
    /// Seed for bootstrap sampling.
    pub seed: u64,
}

impl Default for ForestParams {
    fn default() -> Self {
        Self {
            n_estimators: DEFAULT_N_ESTIMATORS,
            max_depth: None,
            min_samples_split: 2,
            min_samples_leaf: 1,
            bootstrap: true,
            seed: DEFAULT_SEED,
        }
    }
}

impl ForestParams {
    /// Check that every parameter is in range.
    pub fn validate(&self) -> Result<(), PickestError> {
        if self.n_estimators == 0 || self.n_estimators > MAX_ESTIMATORS {
            return Err(PickestError::InvalidConfig(format!(
                "n_estimators must be in 1..={}, got {}",
                MAX_ESTIMATORS, self.n_estimators
            )));
        }
        if self.max_depth == Some(0) {
            return Err(PickestError::InvalidConfig(
                "max_depth must be at least 1".to_string(),
            ));
        }
        if self.min_samples_split < 2 {
            return Err(PickestError::InvalidConfig(format!(
                "min_samples_split must be at least 2, got {}",
                self.min_samples_split
            )));
        }
        if self.min_samples_leaf == 0 {
            return Err(PickestError::InvalidConfig(
                "min_samples_leaf must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    fn tree_params(&self) -> TreeParams {
        TreeParams {
            max_depth: self.max_depth,
            min_samples_split: self.min_samples_split,
            min_samples_leaf: self.min_samples_leaf,
        }
    }
}

// =============================================================================
// FOREST
// =============================================================================

/// A fitted random forest regressor.
#[derive(Debug, Clone, PartialEq)]
pub struct RandomForest {
    params: ForestParams,
    trees: Vec<RegressionTree>,
}

impl RandomForest {
    /// Fit a forest on the training rows.
    pub fn fit(train: &Dataset, params: ForestParams) -> Result<Self, PickestError> {
        params.validate()?;
        if train.is_empty() {
            return Err(PickestError::EmptyTrainingSet);
        }

        let started = Instant::now();
        let n = train.len();
        let tree_params = params.tree_params();
        let mut rng = StdRng::seed_from_u64(params.seed);
        let mut trees = Vec::with_capacity(params.n_estimators);

        for t in 0..params.n_estimators {
            let mut tree_rng = StdRng::seed_from_u64(rng.random::<u64>());
            let samples: Vec<usize> = if params.bootstrap {
                (0..n).map(|_| tree_rng.random_range(0..n)).collect()
            } else {
                (0..n).collect()
            };

            let tree = RegressionTree::fit(train.features(), train.targets(), samples, &tree_params)?;
            tracing::debug!(
                tree = t,
                nodes = tree.nodes().len(),
                leaves = tree.leaf_count(),
                depth = tree.depth(),
                "tree grown"
            );
            trees.push(tree);
        }

        tracing::info!(
            trees = trees.len(),
            rows = n,
            elapsed_ms = started.elapsed().as_millis() as u64,
            "forest fitted"
        );

        Ok(Self { params, trees })
    }

    /// Reassemble a forest from stored parts.
    pub fn from_parts(
        params: ForestParams,
        trees: Vec<RegressionTree>,
    ) -> Result<Self, PickestError> {
        if trees.is_empty() {
            return Err(PickestError::DeserializationError(
                "forest has no trees".to_string(),
            ));
        }
        Ok(Self { params, trees })
    }

    /// Mean prediction of all trees for one row.
    #[must_use]
    pub fn predict(&self, x: &FeatureVector) -> f64 {
        let sum: f64 = self.trees.iter().map(|t| t.predict(x)).sum();
        sum / self.trees.len().max(1) as f64
    }

    /// Predict every row.
    #[must_use]
    pub fn predict_batch(&self, rows: &[FeatureVector]) -> Vec<f64> {
        rows.iter().map(|x| self.predict(x)).collect()
    }

    /// Parameters the forest was fitted with.
    #[must_use]
    pub fn params(&self) -> &ForestParams {
        &self.params
    }

    /// Fitted trees.
    #[must_use]
    pub fn trees(&self) -> &[RegressionTree] {
        &self.trees
    }

    /// Total node count across all trees.
    #[must_use]
    pub fn node_count(&self) -> usize {
        self.trees.iter().map(|t| t.nodes().len()).sum()
    }
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PickingRecord;

    fn linear_dataset(n: usize) -> Dataset {
        let records: Vec<PickingRecord> = (0..n)
            .map(|i| {
                let items = (i % 20) as f32 + 1.0;
                let distance = (i % 7) as f32 * 3.0;
                PickingRecord::new(
                    [items, 1.0, 0.5, distance, 5.0, 0.5],
                    items * 0.5 + distance * 0.2,
                )
            })
            .collect();
        Dataset::from_records(&records)
    }

    fn small(n_estimators: usize) -> ForestParams {
        ForestParams {
            n_estimators,
            ..ForestParams::default()
        }
    }

    #[test]
    fn defaults_match_procedure() {
        let p = ForestParams::default();
        assert_eq!(p.n_estimators, 100);
        assert_eq!(p.seed, 42);
        assert!(p.bootstrap);
        assert!(p.validate().is_ok());
    }

    #[test]
    fn invalid_params_rejected() {
        for p in [
            small(0),
            ForestParams {
                max_depth: Some(0),
                ..small(1)
            },
            ForestParams {
                min_samples_split: 1,
                ..small(1)
            },
            ForestParams {
                min_samples_leaf: 0,
                ..small(1)
            },
        ] {
            assert!(matches!(p.validate(), Err(PickestError::InvalidConfig(_))));
        }
    }

    #[test]
    fn fit_produces_requested_trees() {
        let forest = RandomForest::fit(&linear_dataset(60), small(8)).expect("fit");
        assert_eq!(forest.trees().len(), 8);
        assert!(forest.node_count() >= 8);
    }

    #[test]
    fn same_seed_same_forest() {
        let ds = linear_dataset(50);
        let a = RandomForest::fit(&ds, small(5)).expect("fit");
        let b = RandomForest::fit(&ds, small(5)).expect("fit");
        assert_eq!(a, b);
    }

    #[test]
    fn different_seed_different_bootstrap() {
        let ds = linear_dataset(50);
        let a = RandomForest::fit(&ds, small(5)).expect("fit");
        let b = RandomForest::fit(
            &ds,
            ForestParams {
                seed: 7,
                ..small(5)
            },
        )
        .expect("fit");
        assert_ne!(a, b);
    }

    #[test]
    fn predictions_track_target() {
        let ds = linear_dataset(200);
        let forest = RandomForest::fit(&ds, small(20)).expect("fit");
        // items = 10, distance = 6 -> 5.0 + 1.2
        let pred = forest.predict(&[10.0, 1.0, 0.5, 6.0, 5.0, 0.5]);
        assert!((pred - 6.2).abs() < 1.0, "prediction {pred}");
    }

    #[test]
    fn without_bootstrap_trees_are_identical() {
        let ds = linear_dataset(30);
        let forest = RandomForest::fit(
            &ds,
            ForestParams {
                bootstrap: false,
                ..small(3)
            },
        )
        .expect("fit");
        assert_eq!(forest.trees()[0], forest.trees()[2]);
    }

    #[test]
    fn empty_training_rejected() {
        assert_eq!(
            RandomForest::fit(&Dataset::default(), small(1)),
            Err(PickestError::EmptyTrainingSet)
        );
    }
}
