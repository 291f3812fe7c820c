//! # Split Module
//!
//! Seeded train/held-out partitioning.
//!
//! The training subset holds `round((1 - test_fraction) * N)` rows; the
//! held-out subset holds the rest. Rows are assigned through a permutation
//! drawn from a `StdRng` seeded with the configured seed, so a given dataset
//! and seed always produce the same partition.

use crate::PickestError;
use crate::dataset::Dataset;
use rand::SeedableRng;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;

/// Result of partitioning a dataset.
#[derive(Debug, Clone, PartialEq)]
pub struct TrainTestSplit {
    /// Rows used for fitting.
    pub train: Dataset,
    /// Rows held out for evaluation.
    pub test: Dataset,
    /// Source row indices of `train`, in order.
    pub train_indices: Vec<usize>,
    /// Source row indices of `test`, in order.
    pub test_indices: Vec<usize>,
}

/// Number of training rows for `n` rows and the given held-out fraction.
#[must_use]
pub fn train_len(n: usize, test_fraction: f64) -> usize {
    let len = ((n as f64) * (1.0 - test_fraction)).round() as usize;
    len.min(n)
}

/// Partition `dataset` into training and held-out subsets.
pub fn train_test_split(
    dataset: &Dataset,
    test_fraction: f64,
    seed: u64,
) -> Result<TrainTestSplit, PickestError> {
    if !(test_fraction > 0.0 && test_fraction < 1.0) {
        return Err(PickestError::InvalidConfig(format!(
            "test_fraction must be in (0, 1), got {}",
            test_fraction
        )));
    }

    let n = dataset.len();
    let n_train = train_len(n, test_fraction);
    if n_train == 0 {
        return Err(PickestError::EmptyTrainingSet);
    }

    let mut permutation: Vec<usize> = (0..n).collect();
    let mut rng = StdRng::seed_from_u64(seed);
    permutation.shuffle(&mut rng);

    let test_indices = permutation.split_off(n_train);
    let train_indices = permutation;

    Ok(TrainTestSplit {
        train: dataset.subset(&train_indices),
        test: dataset.subset(&test_indices),
        train_indices,
        test_indices,
    })
}

// =============================================================================
// TESTS
// =============================================================================
