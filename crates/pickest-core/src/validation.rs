//! # Input Validation
//!
//! Range checks for a feature vector before it is scored.
//!
//! Every rule is evaluated; all violations are reported together.

use crate::{FeatureVector, PickestError};

/// Check a feature vector against the plausible range of each column.
///
/// | Column | Rule |
/// |---|---|
/// | ItemCount | `>= 1` |
/// | Weight, Volume, Distance | `>= 0` |
/// | PickerExperience | `1..=10` |
/// | StockDensity | `0..=1` |
///
/// Non-finite values are always rejected.
pub fn validate_features(features: &FeatureVector) -> Result<(), PickestError> {
    let [items, weight, volume, distance, experience, density] = *features;
    let mut errors: Vec<String> = Vec::new();

    for (name, value) in crate::primitives::FEATURE_COLUMNS.iter().zip(features) {
        if !value.is_finite() {
            errors.push(format!("{} must be a finite number", name));
        }
    }

    if items < 1.0 {
        errors.push("ItemCount must be at least 1".to_string());
    }
    if weight < 0.0 {
        errors.push("Weight cannot be negative".to_string());
    }
    if volume < 0.0 {
        errors.push("Volume cannot be negative".to_string());
    }
    if distance < 0.0 {
        errors.push("Distance cannot be negative".to_string());
    }
    if !(1.0..=10.0).contains(&experience) && !experience.is_nan() {
        errors.push("PickerExperience must be between 1 and 10".to_string());
    }
    if !(0.0..=1.0).contains(&density) && !density.is_nan() {
        errors.push("StockDensity must be between 0 and 1".to_string());
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(PickestError::InvalidInput(errors.join("; ")))
    }
}
