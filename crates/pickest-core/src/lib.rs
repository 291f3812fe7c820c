//! # pickest-core
//!
//! The picking-time model export engine for Pickest - THE LOGIC.
//!
//! This crate turns a table of warehouse picking jobs into a fitted random
//! forest regressor and serializes it as an ONNX `TreeEnsembleRegressor`
//! graph that any ONNX runtime can evaluate.
//!
//! ## Procedure
//!
//! ```text
//! picking_data.csv → Dataset → TrainTestSplit → RandomForest
//!                  → (picking_model.ckpt) → model.onnx
//! ```
//!
//! ## Architectural Constraints
//!
//! - Pure Rust: no async, no network dependencies
//! - Deterministic: the same data and seeds produce byte-identical artifacts
//! - Feature order is fixed (`primitives::FEATURE_COLUMNS`) and shared by
//!   training, the checkpoint and the exported graph
//! - Fallible operations return `Result<_, PickestError>`

// =============================================================================
// MODULES
// =============================================================================

pub mod dataset;
pub mod drift;
pub mod forest;
pub mod formats;
pub mod metrics;
pub mod onnx;
pub mod pipeline;
pub mod primitives;
pub mod registry;
pub mod split;
pub mod types;
pub mod validation;

// =============================================================================
// RE-EXPORTS: Core Types (from types module)
// =============================================================================

pub use types::{FeatureVector, PickestError, PickingRecord, feature_vector};

// =============================================================================
// RE-EXPORTS: Procedure
// =============================================================================

pub use dataset::Dataset;
pub use drift::{DriftReport, FeatureMeans};
pub use forest::{ForestParams, RandomForest};
pub use metrics::RegressionMetrics;
pub use pipeline::{ExportConfig, ExportReport, run_export};
pub use split::{TrainTestSplit, train_test_split};
pub use validation::validate_features;

// =============================================================================
// RE-EXPORTS: Formats and Interchange
// =============================================================================

pub use formats::{artifact_checksum, forest_from_bytes, forest_to_bytes};
pub use onnx::{OnnxExportOptions, OnnxModel, TensorSignature, export_onnx};
pub use registry::{ModelVersion, VersionLedger};
