//! # Checkpoint Format
//!
//! Native binary serialization for fitted forests.
//!
//! Format: Header (5 bytes) + postcard-serialized forest data.
//! - 4 bytes: Magic ("PKCK")
//! - 1 byte: Version
//!
//! The payload records the feature order the forest was trained with;
//! a checkpoint trained on a different order is rejected on load.
//! File I/O lives in the pipeline; this module only transforms bytes.

use crate::forest::{ForestParams, RandomForest, RegressionTree, TreeNode};
use crate::primitives::{self, FEATURE_COLUMNS};
use crate::PickestError;
use serde::{Deserialize, Serialize};

// =============================================================================
// LIMITS
// =============================================================================

/// Maximum allowed checkpoint size.
///
/// Checked before any payload decoding.
pub const MAX_CHECKPOINT_SIZE: usize = 512 * 1024 * 1024; // 512 MB

/// Minimum valid checkpoint size (header only).
const HEADER_LEN: usize = 5;

// =============================================================================
// HEADER
// =============================================================================

/// The checkpoint header precedes all forest data.
#[derive(Debug, Clone, Copy)]
pub struct CheckpointHeader {
    pub magic: [u8; 4],
    pub version: u8,
}

impl CheckpointHeader {
    /// Create a new header with the current format version.
    #[must_use]
    pub fn new() -> Self {
        Self {
            magic: *primitives::MAGIC_BYTES,
            version: primitives::FORMAT_VERSION,
        }
    }

    /// Validate the header.
    pub fn validate(&self) -> Result<(), PickestError> {
        if &self.magic != primitives::MAGIC_BYTES {
            return Err(PickestError::DeserializationError(
                "Invalid magic bytes".to_string(),
            ));
        }
        if self.version != primitives::FORMAT_VERSION {
            return Err(PickestError::DeserializationError(format!(
                "Unsupported version: {} (expected {})",
                self.version,
                primitives::FORMAT_VERSION
            )));
        }
        Ok(())
    }

    /// Write header to bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_LEN] {
        let mut bytes = [0u8; HEADER_LEN];
        bytes[0..4].copy_from_slice(&self.magic);
        bytes[4] = self.version;
        bytes
    }

    /// Read header from bytes.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, PickestError> {
        if bytes.len() < HEADER_LEN {
            return Err(PickestError::DeserializationError(
                "Header too short".to_string(),
            ));
        }
        let mut magic = [0u8; 4];
        magic.copy_from_slice(&bytes[0..4]);
        Ok(Self {
            magic,
            version: bytes[4],
        })
    }
}

impl Default for CheckpointHeader {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// PAYLOAD
// =============================================================================

/// Serializable form of a forest.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ForestCheckpoint {
    /// Feature order the forest consumes.
    pub feature_columns: Vec<String>,
    /// Parameters the forest was fitted with.
    pub params: ForestParams,
    /// Nodes of each tree.
    pub trees: Vec<Vec<TreeNode>>,
}

impl From<&RandomForest> for ForestCheckpoint {
    fn from(forest: &RandomForest) -> Self {
        Self {
            feature_columns: FEATURE_COLUMNS.iter().map(|c| (*c).to_string()).collect(),
            params: *forest.params(),
            trees: forest.trees().iter().map(|t| t.nodes().to_vec()).collect(),
        }
    }
}

impl TryFrom<ForestCheckpoint> for RandomForest {
    type Error = PickestError;

    fn try_from(cp: ForestCheckpoint) -> Result<Self, Self::Error> {
        if cp.feature_columns.iter().map(String::as_str).ne(FEATURE_COLUMNS) {
            return Err(PickestError::DeserializationError(format!(
                "Checkpoint feature order [{}] does not match [{}]",
                cp.feature_columns.join(", "),
                FEATURE_COLUMNS.join(", ")
            )));
        }
        let trees = cp
            .trees
            .into_iter()
            .map(RegressionTree::from_nodes)
            .collect::<Result<Vec<_>, _>>()?;
        RandomForest::from_parts(cp.params, trees)
    }
}

// =============================================================================
// SERIALIZATION FUNCTIONS
// =============================================================================

/// Serialize a forest to bytes (header + payload).
pub fn forest_to_bytes(forest: &RandomForest) -> Result<Vec<u8>, PickestError> {
    let header = CheckpointHeader::new();
    let payload = postcard::to_stdvec(&ForestCheckpoint::from(forest))
        .map_err(|e| PickestError::SerializationError(e.to_string()))?;

    let mut result = Vec::with_capacity(HEADER_LEN + payload.len());
    result.extend_from_slice(&header.to_bytes());
    result.extend_from_slice(&payload);

    Ok(result)
}

/// Deserialize a forest from bytes.
///
/// Size and header are validated before the payload is decoded.
pub fn forest_from_bytes(bytes: &[u8]) -> Result<RandomForest, PickestError> {
    if bytes.len() < HEADER_LEN {
        return Err(PickestError::DeserializationError(format!(
            "Data too short: minimum {} bytes required",
            HEADER_LEN
        )));
    }
    if bytes.len() > MAX_CHECKPOINT_SIZE {
        return Err(PickestError::DeserializationError(format!(
            "Data size {} bytes exceeds maximum allowed {} bytes",
            bytes.len(),
            MAX_CHECKPOINT_SIZE
        )));
    }

    let header = CheckpointHeader::from_bytes(bytes)?;
    header.validate()?;

    let checkpoint: ForestCheckpoint = postcard::from_bytes(&bytes[HEADER_LEN..]).map_err(|e| {
        PickestError::DeserializationError(format!("Failed to deserialize forest data: {}", e))
    })?;

    RandomForest::try_from(checkpoint)
}

// =============================================================================
// TESTS
// =============================================================================
