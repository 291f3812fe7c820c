//! # Configuration
//!
//! Optional TOML file layered between built-in defaults and command-line
//! flags:
//!
//! ```text
//! defaults  <  pickest.toml  <  flags
//! ```
//!
//! ```toml
//! [data]
//! path = "picking_data.csv"
//!
//! [split]
//! test_fraction = 0.2
//! seed = 42
//!
//! [forest]
//! n_estimators = 100
//! max_depth = 12
//!
//! [output]
//! model = "model.onnx"
//! checkpoint = "picking_model.ckpt"
//! write_checkpoint = true
//!
//! [registry]
//! enabled = false
//! ledger = "models/versions.json"
//! archive_dir = "models/archive"
//! retention = 5
//! ```

use crate::cli::ExportArgs;
use pickest_core::primitives::{DEFAULT_ARCHIVE_DIR, DEFAULT_LEDGER_PATH, DEFAULT_RETENTION};
use pickest_core::{ExportConfig, PickestError, VersionLedger};
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Config file looked up in the working directory when `--config` is absent.
pub const DEFAULT_CONFIG_FILE: &str = "pickest.toml";

// =============================================================================
// ERRORS
// =============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("Invalid config at {path}: {source}")]
    ParseToml {
        path: PathBuf,
        source: toml::de::Error,
    },
}

impl From<ConfigError> for PickestError {
    fn from(e: ConfigError) -> Self {
        PickestError::InvalidConfig(e.to_string())
    }
}

// =============================================================================
// FILE SECTIONS
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct DataSection {
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct SplitSection {
    pub test_fraction: Option<f64>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct ForestSection {
    pub n_estimators: Option<usize>,
    pub max_depth: Option<usize>,
    pub min_samples_split: Option<usize>,
    pub min_samples_leaf: Option<usize>,
    pub bootstrap: Option<bool>,
    pub seed: Option<u64>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct OutputSection {
    pub model: Option<PathBuf>,
    pub checkpoint: Option<PathBuf>,
    pub write_checkpoint: Option<bool>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct RegistrySection {
    pub enabled: Option<bool>,
    pub ledger: Option<PathBuf>,
    pub archive_dir: Option<PathBuf>,
    pub retention: Option<usize>,
}

/// Contents of a config file. Every key is optional.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub data: DataSection,
    pub split: SplitSection,
    pub forest: ForestSection,
    pub output: OutputSection,
    pub registry: RegistrySection,
}

impl FileConfig {
    /// Parse TOML text. `origin` names the source in errors.
    pub fn parse(text: &str, origin: &Path) -> Result<Self, ConfigError> {
        toml::from_str(text).map_err(|source| ConfigError::ParseToml {
            path: origin.to_path_buf(),
            source,
        })
    }

    /// Ledger described by the `[registry]` section.
    #[must_use]
    pub fn ledger(&self) -> VersionLedger {
        let r = &self.registry;
        VersionLedger::new(
            r.ledger.clone().unwrap_or_else(|| PathBuf::from(DEFAULT_LEDGER_PATH)),
            r.archive_dir
                .clone()
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ARCHIVE_DIR)),
        )
        .with_retention(r.retention.unwrap_or(DEFAULT_RETENTION))
    }
}

// =============================================================================
// LOADING
// =============================================================================

/// Load the config file.
///
/// An explicit path must exist. Without one, `pickest.toml` in the working
/// directory is used when present and defaults otherwise.
pub fn load(explicit: Option<&Path>) -> Result<FileConfig, ConfigError> {
    let path = match explicit {
        Some(p) => p.to_path_buf(),
        None => {
            let p = PathBuf::from(DEFAULT_CONFIG_FILE);
            if !p.is_file() {
                return Ok(FileConfig::default());
            }
            p
        }
    };

    let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
        path: path.clone(),
        source,
    })?;
    let config = FileConfig::parse(&text, &path)?;
    tracing::debug!(path = %path.display(), "Config file loaded");
    Ok(config)
}

// =============================================================================
// MERGING
// =============================================================================

/// Everything an export run needs once all layers are applied.
#[derive(Debug, Clone, PartialEq)]
pub struct ExportSettings {
    pub export: ExportConfig,
    /// Ledger to record the export in, when registration is on.
    pub ledger: Option<VersionLedger>,
}

/// Apply the file over the defaults, then the flags over the result.
#[must_use]
pub fn resolve(file: &FileConfig, args: &ExportArgs) -> ExportSettings {
    let mut export = ExportConfig::default();

    // File layer.
    if let Some(p) = &file.data.path {
        export.data_path = p.clone();
    }
    if let Some(f) = file.split.test_fraction {
        export.test_fraction = f;
    }
    if let Some(s) = file.split.seed {
        export.split_seed = s;
    }
    let forest = &mut export.forest;
    if let Some(n) = file.forest.n_estimators {
        forest.n_estimators = n;
    }
    if file.forest.max_depth.is_some() {
        forest.max_depth = file.forest.max_depth;
    }
    if let Some(n) = file.forest.min_samples_split {
        forest.min_samples_split = n;
    }
    if let Some(n) = file.forest.min_samples_leaf {
        forest.min_samples_leaf = n;
    }
    if let Some(b) = file.forest.bootstrap {
        forest.bootstrap = b;
    }
    if let Some(s) = file.forest.seed {
        forest.seed = s;
    }
    if let Some(p) = &file.output.model {
        export.model_path = p.clone();
    }
    if let Some(p) = &file.output.checkpoint {
        export.checkpoint_path = Some(p.clone());
    }
    if file.output.write_checkpoint == Some(false) {
        export.checkpoint_path = None;
    }

    // Flag layer.
    if let Some(p) = &args.data {
        export.data_path = p.clone();
    }
    if let Some(p) = &args.output {
        export.model_path = p.clone();
    }
    if let Some(p) = &args.checkpoint {
        export.checkpoint_path = Some(p.clone());
    } else if args.no_checkpoint {
        export.checkpoint_path = None;
    }
    if let Some(f) = args.test_fraction {
        export.test_fraction = f;
    }
    if let Some(s) = args.seed {
        export.split_seed = s;
        export.forest.seed = s;
    }
    if let Some(n) = args.trees {
        export.forest.n_estimators = n;
    }
    if args.max_depth.is_some() {
        export.forest.max_depth = args.max_depth;
    }

    let register = args.register || file.registry.enabled.unwrap_or(false);

    ExportSettings {
        export,
        ledger: register.then(|| file.ledger()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_file_is_default() {
        let cfg = FileConfig::parse("", Path::new("pickest.toml")).expect("parse");
        assert_eq!(cfg, FileConfig::default());
    }

    #[test]
    fn unknown_key_rejected() {
        let err = FileConfig::parse("[forest]\ntrees = 3\n", Path::new("bad.toml"))
            .expect_err("unknown key");
        assert!(err.to_string().contains("bad.toml"));
    }

    #[test]
    fn missing_default_file_is_default() {
        // The test working directory is the crate root, which has no pickest.toml.
        assert_eq!(load(None).expect("load"), FileConfig::default());
    }

    #[test]
    fn missing_explicit_file_is_error() {
        let err = load(Some(Path::new("does/not/exist.toml"))).expect_err("missing");
        assert!(matches!(err, ConfigError::Read { .. }));
    }
}
