//! # Formats Module
//!
//! Byte-level formats, artifact checksums and the file writer shared by all
//! artifacts.

pub mod checkpoint;

pub use checkpoint::{
    CheckpointHeader, ForestCheckpoint, MAX_CHECKPOINT_SIZE, forest_from_bytes, forest_to_bytes,
};

use crate::PickestError;
use std::io::Write;
use std::path::Path;

/// Write `bytes` to `path` so that readers see either the old file or the
/// complete new one.
///
/// The data goes to a temp file in the destination directory, is flushed to
/// disk, then renamed over `path`. On any error the temp file is removed.
pub fn write_atomic(path: &Path, bytes: &[u8]) -> Result<(), PickestError> {
    let dir = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let mut tmp = tempfile::NamedTempFile::new_in(dir).map_err(|e| {
        PickestError::IoError(format!(
            "Cannot create temp file in '{}': {}",
            dir.display(),
            e
        ))
    })?;
    tmp.write_all(bytes)?;
    tmp.as_file().sync_all()?;
    tmp.persist(path).map_err(|e| {
        PickestError::IoError(format!("Cannot write '{}': {}", path.display(), e.error))
    })?;

    Ok(())
}

// =============================================================================
// CHECKSUMS
// =============================================================================

const FNV_OFFSET_BASIS: u64 = 0xcbf2_9ce4_8422_2325;
const FNV_PRIME: u64 = 0x0000_0100_0000_01b3;

/// 64-bit FNV-1a checksum of an artifact.
///
/// Detects accidental corruption. Not a cryptographic hash; see
/// [`artifact_digest`] for that.
#[must_use]
pub fn artifact_checksum(bytes: &[u8]) -> u64 {
    bytes.iter().fold(FNV_OFFSET_BASIS, |hash, &b| {
        (hash ^ u64::from(b)).wrapping_mul(FNV_PRIME)
    })
}

/// BLAKE3 digest of an artifact as a 64-character hex string.
///
/// Returns `None` unless the `crypto-hash` feature is enabled.
#[cfg(feature = "crypto-hash")]
#[must_use]
pub fn artifact_digest(bytes: &[u8]) -> Option<String> {
    Some(blake3::hash(bytes).to_hex().to_string())
}

/// BLAKE3 digest of an artifact as a 64-character hex string.
///
/// Returns `None` unless the `crypto-hash` feature is enabled.
#[cfg(not(feature = "crypto-hash"))]
#[must_use]
pub fn artifact_digest(_bytes: &[u8]) -> Option<String> {
    None
}
