//! # Core Type Definitions
//!
//! This module contains the types shared by every stage of the procedure:
//! - The fixed-width feature vector (`FeatureVector`)
//! - A single labelled row (`PickingRecord`)
//! - Error types (`PickestError`)

use crate::primitives::{FEATURE_COLUMNS, FEATURE_COUNT};
use serde::{Deserialize, Serialize};
use thiserror::Error;

// =============================================================================
// FEATURES
// =============================================================================

/// Six features in `FEATURE_COLUMNS` order.
pub type FeatureVector = [f32; FEATURE_COUNT];

/// Build a feature vector from a slice, checking its width.
pub fn feature_vector(values: &[f32]) -> Result<FeatureVector, PickestError> {
    values.try_into().map_err(|_| {
        PickestError::InvalidInput(format!(
            "expected {} feature values ({}), got {}",
            FEATURE_COUNT,
            FEATURE_COLUMNS.join(", "),
            values.len()
        ))
    })
}

// =============================================================================
// RECORD
// =============================================================================

/// One labelled picking job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PickingRecord {
    /// Features in `FEATURE_COLUMNS` order.
    pub features: FeatureVector,
    /// Observed picking time in minutes.
    pub picking_time: f32,
}

impl PickingRecord {
    /// Create a new record.
    #[must_use]
    pub const fn new(features: FeatureVector, picking_time: f32) -> Self {
        Self {
            features,
            picking_time,
        }
    }
}

// =============================================================================
// ERRORS
// =============================================================================

/// Errors that can occur anywhere in the export procedure.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum PickestError {
    /// The dataset header lacks a required column.
    #[error("Missing required column: {0}")]
    MissingColumn(String),

    /// A data row could not be turned into a record.
    #[error("Malformed row at line {line}: {reason}")]
    MalformedRow {
        /// 1-based line number in the source file.
        line: u64,
        /// What was wrong with the row.
        reason: String,
    },

    /// The dataset has a header but no rows.
    #[error("Dataset contains no rows")]
    EmptyDataset,

    /// The split left no rows to train on.
    #[error("Training subset is empty")]
    EmptyTrainingSet,

    /// A configuration value is out of range.
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A serialization error occurred.
    #[error("Serialization error: {0}")]
    SerializationError(String),

    /// A deserialization error occurred.
    #[error("Deserialization error: {0}")]
    DeserializationError(String),

    /// The ONNX graph does not have the expected structure.
    #[error("Invalid model: {0}")]
    InvalidModel(String),

    /// The ONNX graph uses a construct the runtime does not evaluate.
    #[error("Unsupported: {0}")]
    Unsupported(String),

    /// A prediction input failed validation.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    IoError(String),
}

impl From<std::io::Error> for PickestError {
    fn from(e: std::io::Error) -> Self {
        Self::IoError(e.to_string())
    }
}

// =============================================================================
// TESTS
// =============================================================================
