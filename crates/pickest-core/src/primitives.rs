//! # Fixed Primitives
//!
//! Compiled-in constants for the Pickest export procedure.
//!
//! These are the defaults of the procedure and the limits that guard it.
//! Configuration may override the defaults; the limits are fixed.

// =============================================================================
// SCHEMA
// =============================================================================

/// Number of features the model consumes.
pub const FEATURE_COUNT: usize = 6;

/// Feature columns, in the order the model consumes them.
///
/// This order is shared by training, the checkpoint format and the exported
/// ONNX graph. Any consumer must build its input vectors in this order.
pub const FEATURE_COLUMNS: [&str; FEATURE_COUNT] = [
    "ItemCount",
    "Weight",
    "Volume",
    "Distance",
    "PickerExperience",
    "StockDensity",
];

/// Target column (picking duration in minutes).
pub const TARGET_COLUMN: &str = "PickingTime";

// =============================================================================
// PROCEDURE DEFAULTS
// =============================================================================

/// Default dataset location.
pub const DEFAULT_DATA_PATH: &str = "picking_data.csv";

/// Default ONNX artifact location.
pub const DEFAULT_MODEL_PATH: &str = "model.onnx";

/// Default native checkpoint location.
pub const DEFAULT_CHECKPOINT_PATH: &str = "picking_model.ckpt";

/// Fraction of rows held out from training.
pub const DEFAULT_TEST_FRACTION: f64 = 0.2;

/// Seed shared by the split and the forest.
pub const DEFAULT_SEED: u64 = 42;

/// Number of trees in the forest.
pub const DEFAULT_N_ESTIMATORS: usize = 100;

// =============================================================================
// VERSION LEDGER
// =============================================================================

/// Default location of the version ledger.
pub const DEFAULT_LEDGER_PATH: &str = "models/versions.json";

/// Default directory for archived artifacts.
pub const DEFAULT_ARCHIVE_DIR: &str = "models/archive";

/// Ledger entries kept by default.
pub const DEFAULT_RETENTION: usize = 5;

// =============================================================================
// DRIFT
// =============================================================================

/// Drift, in percent of the training mean, at which a feature raises an alarm.
pub const DEFAULT_DRIFT_THRESHOLD: f64 = 20.0;

// =============================================================================
// ONNX GRAPH NAMES
// =============================================================================

/// Name of the graph input tensor.
pub const INPUT_TENSOR_NAME: &str = "input";

/// Name of the graph output tensor.
pub const OUTPUT_TENSOR_NAME: &str = "variable";

/// Symbolic name of the batch dimension.
pub const BATCH_DIM_PARAM: &str = "N";

// =============================================================================
// CHECKPOINT FORMAT
// =============================================================================

/// Magic bytes for the native checkpoint header.
pub const MAGIC_BYTES: &[u8; 4] = b"PKCK";

/// Current checkpoint format version.
///
/// Increment this when making breaking changes to the checkpoint payload.
pub const FORMAT_VERSION: u8 = 1;

// =============================================================================
// INPUT LIMITS
// =============================================================================

/// Maximum dataset file size (256 MB).
pub const MAX_DATASET_FILE_SIZE: u64 = 256 * 1024 * 1024;

/// Maximum ONNX artifact size accepted by the runtime (512 MB).
pub const MAX_MODEL_FILE_SIZE: u64 = 512 * 1024 * 1024;

/// Maximum number of trees a forest may hold.
pub const MAX_ESTIMATORS: usize = 10_000;
