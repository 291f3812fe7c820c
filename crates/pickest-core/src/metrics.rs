//! # Regression Metrics
//!
//! Held-out scoring of a fitted forest.

use crate::dataset::Dataset;
use crate::forest::RandomForest;
use serde::{Deserialize, Serialize};

/// Goodness of fit on a set of rows.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RegressionMetrics {
    /// Coefficient of determination.
    pub r_squared: f64,
    /// Mean absolute error.
    pub mean_absolute_error: f64,
    /// Root mean squared error.
    pub root_mean_squared_error: f64,
    /// Mean squared error (the training loss).
    pub loss: f64,
    /// Rows scored.
    pub rows: usize,
}

impl RegressionMetrics {
    /// Score `forest` on `dataset`. Returns `None` for an empty dataset.
    #[must_use]
    pub fn evaluate(forest: &RandomForest, dataset: &Dataset) -> Option<Self> {
        let predictions = forest.predict_batch(dataset.features());
        Self::from_predictions(dataset.targets(), &predictions)
    }

    /// Score predictions against actual values.
    ///
    /// R² is 1.0 for a perfect fit of a constant target and 0.0 for any
    /// other fit of a constant target.
    #[must_use]
    pub fn from_predictions(actual: &[f32], predicted: &[f64]) -> Option<Self> {
        let n = actual.len().min(predicted.len());
        if n == 0 {
            return None;
        }

        let mean = actual[..n].iter().map(|&y| f64::from(y)).sum::<f64>() / n as f64;
        let mut abs_sum = 0.0;
        let mut ss_res = 0.0;
        let mut ss_tot = 0.0;
        for (&y, &p) in actual.iter().zip(predicted.iter()) {
            let y = f64::from(y);
            let err = y - p;
            abs_sum += err.abs();
            ss_res += err * err;
            ss_tot += (y - mean) * (y - mean);
        }

        let r_squared = if ss_tot > 0.0 {
            1.0 - ss_res / ss_tot
        } else if ss_res == 0.0 {
            1.0
        } else {
            0.0
        };
        let mse = ss_res / n as f64;

        Some(Self {
            r_squared,
            mean_absolute_error: abs_sum / n as f64,
            root_mean_squared_error: mse.sqrt(),
            loss: mse,
            rows: n,
        })
    }
}
