//! # Feature Drift
//!
//! Compares the per-feature means a model was trained on with the means of a
//! live batch.
//!
//! The drift of one feature is `|live - baseline| / |baseline| * 100`, or 0
//! when the baseline mean is 0. The batch raises an alarm when any feature
//! drifts by at least the threshold.

use crate::primitives::{FEATURE_COLUMNS, FEATURE_COUNT};
use crate::PickestError;
use serde::{Deserialize, Serialize};

/// Per-feature means, in `FEATURE_COLUMNS` order.
pub type FeatureMeans = [f64; FEATURE_COUNT];

/// Drift of a live batch against the training baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftReport {
    /// Training means.
    pub baseline: FeatureMeans,
    /// Live batch means.
    pub live: FeatureMeans,
    /// Drift per feature, in percent.
    pub ratios: FeatureMeans,
    /// True when any ratio reaches the threshold.
    pub alarm: bool,
    /// Alarm threshold, in percent.
    pub threshold_percent: f64,
}

impl DriftReport {
    /// Names and ratios of the features at or above the threshold.
    pub fn drifted(&self) -> impl Iterator<Item = (&'static str, f64)> + '_ {
        (0..FEATURE_COUNT)
            .filter(move |&i| self.ratios[i] >= self.threshold_percent)
            .map(move |i| (FEATURE_COLUMNS[i], self.ratios[i]))
    }
}

/// Drift of one feature, in percent.
#[must_use]
pub fn drift_ratio(baseline: f64, live: f64) -> f64 {
    if baseline == 0.0 {
        return 0.0;
    }
    (live - baseline).abs() / baseline.abs() * 100.0
}

/// Compare `live` means against `baseline` means.
pub fn evaluate(
    baseline: &FeatureMeans,
    live: &FeatureMeans,
    threshold_percent: f64,
) -> Result<DriftReport, PickestError> {
    if !threshold_percent.is_finite() || threshold_percent < 0.0 {
        return Err(PickestError::InvalidConfig(format!(
            "drift threshold must be a non-negative percentage, got {}",
            threshold_percent
        )));
    }
    if let Some(name) = FEATURE_COLUMNS
        .iter()
        .zip(baseline.iter().zip(live.iter()))
        .find(|(_, (b, l))| !b.is_finite() || !l.is_finite())
        .map(|(name, _)| name)
    {
        return Err(PickestError::InvalidInput(format!(
            "{} mean must be a finite number",
            name
        )));
    }

    let mut ratios = [0.0; FEATURE_COUNT];
    for (ratio, (&b, &l)) in ratios.iter_mut().zip(baseline.iter().zip(live.iter())) {
        *ratio = drift_ratio(b, l);
    }
    let alarm = ratios.iter().any(|&r| r >= threshold_percent);

    Ok(DriftReport {
        baseline: *baseline,
        live: *live,
        ratios,
        alarm,
        threshold_percent,
    })
}
