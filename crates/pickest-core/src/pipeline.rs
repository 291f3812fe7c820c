//! # Export Pipeline
//!
//! The model export procedure, run to completion:
//!
//! ```text
//! load CSV → split → fit forest → score held-out rows
//!          → (checkpoint) → ONNX → write artifact
//! ```
//!
//! All inputs are loaded and validated before any file is created. Outputs
//! are written atomically, so a failed run never leaves a partial artifact.

use crate::dataset::Dataset;
use crate::drift::FeatureMeans;
use crate::forest::{ForestParams, RandomForest};
use crate::formats::{artifact_checksum, artifact_digest, forest_to_bytes, write_atomic};
use crate::metrics::RegressionMetrics;
use crate::onnx::{OnnxExportOptions, export_onnx};
use crate::primitives::{
    DEFAULT_CHECKPOINT_PATH, DEFAULT_DATA_PATH, DEFAULT_MODEL_PATH, DEFAULT_SEED,
    DEFAULT_TEST_FRACTION,
};
use crate::split::train_test_split;
use crate::PickestError;
use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Inputs of one export run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    /// CSV dataset to train on.
    pub data_path: PathBuf,
    /// Destination of the ONNX artifact.
    pub model_path: PathBuf,
    /// Destination of the native checkpoint; `None` skips it.
    pub checkpoint_path: Option<PathBuf>,
    /// Fraction of rows held out from training.
    pub test_fraction: f64,
    /// Seed of the row shuffle.
    pub split_seed: u64,
    /// Forest hyperparameters.
    pub forest: ForestParams,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            data_path: PathBuf::from(DEFAULT_DATA_PATH),
            model_path: PathBuf::from(DEFAULT_MODEL_PATH),
            checkpoint_path: Some(PathBuf::from(DEFAULT_CHECKPOINT_PATH)),
            test_fraction: DEFAULT_TEST_FRACTION,
            split_seed: DEFAULT_SEED,
            forest: ForestParams::default(),
        }
    }
}

impl ExportConfig {
    /// Check the values before any file is read or written.
    ///
    /// Output paths are compared after resolving their parent directories,
    /// so `./model.onnx` and `model.onnx` name the same destination.
    pub fn validate(&self) -> Result<(), PickestError> {
        if !(self.test_fraction > 0.0 && self.test_fraction < 1.0) {
            return Err(PickestError::InvalidConfig(format!(
                "test_fraction must be in (0, 1), got {}",
                self.test_fraction
            )));
        }
        if self.model_path.as_os_str().is_empty() {
            return Err(PickestError::InvalidConfig(
                "model path is empty".to_string(),
            ));
        }
        if self
            .checkpoint_path
            .as_deref()
            .is_some_and(|ckpt| {
                resolve_destination(ckpt) == resolve_destination(&self.model_path)
            })
        {
            return Err(PickestError::InvalidConfig(format!(
                "checkpoint and model share the path '{}'",
                self.model_path.display()
            )));
        }
        self.forest.validate()
    }
}

/// Destination of an output path: canonical parent plus file name when the
/// parent exists, the path without `.` components otherwise.
fn resolve_destination(path: &Path) -> PathBuf {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };
    match (parent.canonicalize(), path.file_name()) {
        (Ok(dir), Some(name)) => dir.join(name),
        _ => path
            .components()
            .filter(|c| !matches!(c, Component::CurDir))
            .collect(),
    }
}

// =============================================================================
// REPORT
// =============================================================================

/// Outcome of a successful export run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportReport {
    /// Dataset that was loaded.
    pub data_path: PathBuf,
    /// Where the ONNX artifact was written.
    pub model_path: PathBuf,
    /// Where the checkpoint was written, if any.
    pub checkpoint_path: Option<PathBuf>,
    /// Rows in the dataset.
    pub rows: usize,
    /// Rows used for fitting.
    pub train_rows: usize,
    /// Rows held out.
    pub test_rows: usize,
    /// Trees in the fitted forest.
    pub n_estimators: usize,
    /// Nodes across all trees.
    pub node_count: usize,
    /// Held-out scores; `None` when no rows were held out.
    pub metrics: Option<RegressionMetrics>,
    /// Per-column means of the training rows, also recorded in the model.
    pub training_means: Option<FeatureMeans>,
    /// Size of the ONNX artifact.
    pub artifact_bytes: usize,
    /// FNV-1a checksum of the ONNX artifact.
    pub checksum: u64,
    /// BLAKE3 digest of the ONNX artifact (`crypto-hash` feature).
    pub digest: Option<String>,
    /// Wall time of the run.
    pub elapsed_ms: u64,
}

impl ExportReport {
    /// One-line confirmation for the user.
    #[must_use]
    pub fn completion_message(&self) -> String {
        format!("ONNX model created: {}", self.model_path.display())
    }
}

// =============================================================================
// PROCEDURE
// =============================================================================

/// Run the export procedure described by `config`.
pub fn run_export(config: &ExportConfig) -> Result<ExportReport, PickestError> {
    let started = Instant::now();
    config.validate()?;

    info!(path = %config.data_path.display(), "Loading dataset");
    let dataset = Dataset::from_path(&config.data_path)?;
    info!(rows = dataset.len(), "Dataset loaded");

    let split = train_test_split(&dataset, config.test_fraction, config.split_seed)?;
    info!(
        train_rows = split.train.len(),
        test_rows = split.test.len(),
        seed = config.split_seed,
        "Dataset split"
    );

    let forest = RandomForest::fit(&split.train, config.forest)?;
    let training_means = split.train.column_means();

    let metrics = RegressionMetrics::evaluate(&forest, &split.test);
    match &metrics {
        Some(m) => info!(
            r_squared = m.r_squared,
            mae = m.mean_absolute_error,
            rmse = m.root_mean_squared_error,
            loss = m.loss,
            rows = m.rows,
            "Held-out evaluation"
        ),
        None => warn!("Held-out subset is empty, skipping evaluation"),
    }

    if let Some(path) = &config.checkpoint_path {
        let bytes = forest_to_bytes(&forest)?;
        write_atomic(path, &bytes)?;
        info!(path = %path.display(), bytes = bytes.len(), "Checkpoint written");
    }

    let options = OnnxExportOptions {
        training_means,
        ..OnnxExportOptions::default()
    };
    let artifact = export_onnx(&forest, &options);
    write_atomic(&config.model_path, &artifact)?;
    let checksum = artifact_checksum(&artifact);
    info!(
        path = %config.model_path.display(),
        bytes = artifact.len(),
        checksum = format_args!("{:016x}", checksum),
        "ONNX model written"
    );

    Ok(ExportReport {
        data_path: config.data_path.clone(),
        model_path: config.model_path.clone(),
        checkpoint_path: config.checkpoint_path.clone(),
        rows: dataset.len(),
        train_rows: split.train.len(),
        test_rows: split.test.len(),
        n_estimators: forest.trees().len(),
        node_count: forest.node_count(),
        metrics,
        training_means,
        artifact_bytes: artifact.len(),
        checksum,
        digest: artifact_digest(&artifact),
        elapsed_ms: started.elapsed().as_millis() as u64,
    })
}

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::fmt::Write as _;
    use std::path::Path;

    fn write_csv(path: &Path, rows: usize) {
        let mut csv = String::from(
            "ItemCount,Weight,Volume,Distance,PickerExperience,StockDensity,PickingTime\n",
        );
        for i in 0..rows {
            let items = (i % 15) + 1;
            let distance = (i % 11) as f32 * 3.0;
            let time = items as f32 * 0.6 + distance * 0.2;
            writeln!(csv, "{},2.5,1.0,{},5,0.4,{}", items, distance, time).expect("format");
        }
        std::fs::write(path, csv).expect("write csv");
    }

    fn config(dir: &Path) -> ExportConfig {
        ExportConfig {
            data_path: dir.join("picking_data.csv"),
            model_path: dir.join("model.onnx"),
            checkpoint_path: Some(dir.join("picking_model.ckpt")),
            forest: ForestParams {
                n_estimators: 8,
                ..ForestParams::default()
            },
            ..ExportConfig::default()
        }
    }

    #[test]
    fn defaults_match_procedure() {
        let cfg = ExportConfig::default();
        assert_eq!(cfg.data_path, PathBuf::from("picking_data.csv"));
        assert_eq!(cfg.model_path, PathBuf::from("model.onnx"));
        assert_eq!(cfg.test_fraction, 0.2);
        assert_eq!(cfg.split_seed, 42);
        assert_eq!(cfg.forest.n_estimators, 100);
    }

    #[test]
    fn export_writes_both_artifacts() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = config(dir.path());
        write_csv(&cfg.data_path, 50);

        let report = run_export(&cfg).expect("export");

        assert_eq!(report.rows, 50);
        assert_eq!(report.train_rows, 40);
        assert_eq!(report.test_rows, 10);
        assert_eq!(report.n_estimators, 8);
        assert!(report.metrics.is_some());
        assert!(cfg.model_path.exists());
        assert!(cfg.checkpoint_path.as_ref().is_some_and(|p| p.exists()));

        let bytes = std::fs::read(&cfg.model_path).expect("read model");
        assert_eq!(bytes.len(), report.artifact_bytes);
        assert_eq!(artifact_checksum(&bytes), report.checksum);
        assert!(report.completion_message().starts_with("ONNX model created: "));
    }

    #[test]
    fn checkpoint_can_be_skipped() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = ExportConfig {
            checkpoint_path: None,
            ..config(dir.path())
        };
        write_csv(&cfg.data_path, 20);

        let report = run_export(&cfg).expect("export");
        assert!(report.checkpoint_path.is_none());
        assert!(!dir.path().join("picking_model.ckpt").exists());
    }

    #[test]
    fn invalid_config_fails_before_loading() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = ExportConfig {
            test_fraction: 1.0,
            ..config(dir.path())
        };
        // No dataset written: the config error must surface first.
        assert!(matches!(
            run_export(&cfg),
            Err(PickestError::InvalidConfig(_))
        ));
    }

    #[test]
    fn missing_dataset_leaves_no_output() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = config(dir.path());

        assert!(matches!(run_export(&cfg), Err(PickestError::IoError(_))));
        assert!(!cfg.model_path.exists());
    }

    #[test]
    fn shared_output_path_rejected() {
        let cfg = ExportConfig {
            checkpoint_path: Some(PathBuf::from("model.onnx")),
            ..ExportConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(PickestError::InvalidConfig(_))
        ));
    }

    #[test]
    fn shared_output_path_rejected_through_dot() {
        let cfg = ExportConfig {
            checkpoint_path: Some(PathBuf::from("./model.onnx")),
            ..ExportConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(PickestError::InvalidConfig(_))
        ));
    }

    #[test]
    fn shared_output_path_rejected_through_parent_dir() {
        let dir = tempfile::tempdir().expect("tempdir");
        std::fs::create_dir(dir.path().join("sub")).expect("mkdir");
        let cfg = ExportConfig {
            model_path: dir.path().join("model.onnx"),
            checkpoint_path: Some(dir.path().join("sub/../model.onnx")),
            ..ExportConfig::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(PickestError::InvalidConfig(_))
        ));

        let distinct = ExportConfig {
            checkpoint_path: Some(dir.path().join("sub/model.onnx")),
            ..cfg
        };
        assert!(distinct.validate().is_ok());
    }

    #[test]
    fn model_records_training_means() {
        let dir = tempfile::tempdir().expect("tempdir");
        let cfg = config(dir.path());
        write_csv(&cfg.data_path, 30);

        let report = run_export(&cfg).expect("export");
        let model = crate::onnx::OnnxModel::from_path(&cfg.model_path).expect("load");

        assert!(report.training_means.is_some());
        assert_eq!(model.training_means().expect("parse"), report.training_means);
    }
}
