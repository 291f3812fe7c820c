//! # ONNX Module
//!
//! Interchange format support for fitted forests.
//!
//! - `proto`: protobuf messages for the subset of `onnx.proto` in use
//! - `export`: forest to `TreeEnsembleRegressor` graph
//! - `runtime`: loading and evaluating exported graphs

pub mod export;
pub mod proto;
pub mod runtime;

pub use export::{OnnxExportOptions, export_onnx, forest_to_model};
pub use runtime::{Aggregate, OnnxModel, TensorSignature};

/// ONNX IR version written into exported models.
pub const IR_VERSION: i64 = 8;

/// Version of the default (`""`) operator set.
pub const DEFAULT_OPSET_VERSION: i64 = 13;

/// Version of the `ai.onnx.ml` operator set.
pub const ML_OPSET_VERSION: i64 = 3;

/// Domain of the classical machine learning operators.
pub const ML_DOMAIN: &str = "ai.onnx.ml";

/// Operator type of the tree ensemble regressor.
pub const TREE_ENSEMBLE_REGRESSOR: &str = "TreeEnsembleRegressor";
