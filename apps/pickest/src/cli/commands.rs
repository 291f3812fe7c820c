//! # CLI Command Implementations
//!
//! This module contains the actual implementations of CLI commands.

use super::ExportArgs;
use crate::config::{self, FileConfig};
use pickest_core::dataset::{feature_means, read_features};
use pickest_core::primitives::FEATURE_COLUMNS;
use pickest_core::{
    DriftReport, OnnxModel, PickestError, VersionLedger, drift, feature_vector, run_export,
    validate_features,
};
use std::path::{Path, PathBuf};

/// Validate an input file path.
///
/// Canonicalizes the path (resolving symlinks and `..`) and checks that it
/// names an existing regular file.
fn validate_file_path(path: &Path) -> Result<PathBuf, PickestError> {
    let canonical = path.canonicalize().map_err(|e| {
        PickestError::IoError(format!("Invalid file path '{}': {}", path.display(), e))
    })?;

    if !canonical.is_file() {
        return Err(PickestError::IoError(format!(
            "Path '{}' is not a regular file",
            path.display()
        )));
    }

    Ok(canonical)
}

/// Validate an output file path.
///
/// The parent directory must exist; the returned path joins its canonical
/// form with the original file name.
fn validate_output_path(path: &Path) -> Result<PathBuf, PickestError> {
    let parent = match path.parent() {
        Some(p) if !p.as_os_str().is_empty() => p,
        _ => Path::new("."),
    };

    let canonical_parent = parent.canonicalize().map_err(|e| {
        PickestError::IoError(format!(
            "Invalid output directory '{}': {}",
            parent.display(),
            e
        ))
    })?;

    if !canonical_parent.is_dir() {
        return Err(PickestError::IoError(format!(
            "Output directory '{}' is not a valid directory",
            parent.display()
        )));
    }

    let filename = path
        .file_name()
        .ok_or_else(|| PickestError::IoError("Output path has no filename".to_string()))?;

    Ok(canonical_parent.join(filename))
}

fn print_json(value: &serde_json::Value) {
    println!("{}", serde_json::to_string_pretty(value).unwrap_or_default());
}

// =============================================================================
// EXPORT COMMAND
// =============================================================================

/// Train on the dataset and write the ONNX artifact.
pub fn cmd_export(
    file: &FileConfig,
    args: &ExportArgs,
    json_mode: bool,
) -> Result<(), PickestError> {
    let mut settings = config::resolve(file, args);
    let export = &mut settings.export;

    export.data_path = validate_file_path(&export.data_path)?;
    export.model_path = validate_output_path(&export.model_path)?;
    if let Some(ckpt) = &export.checkpoint_path {
        export.checkpoint_path = Some(validate_output_path(ckpt)?);
    }

    let report = run_export(export)?;

    let version = match &settings.ledger {
        Some(ledger) => Some(ledger.record(&report)?),
        None => None,
    };

    if json_mode {
        let output = serde_json::json!({
            "report": report,
            "version": version,
        });
        print_json(&output);
        return Ok(());
    }

    println!("Pickest Export");
    println!("==============");
    println!("Dataset:    {}", report.data_path.display());
    println!(
        "Rows:       {} (train {}, held out {})",
        report.rows, report.train_rows, report.test_rows
    );
    println!(
        "Forest:     {} trees, {} nodes",
        report.n_estimators, report.node_count
    );
    match &report.metrics {
        Some(m) => println!(
            "Held out:   R² {:.4}, MAE {:.4}, RMSE {:.4}",
            m.r_squared, m.mean_absolute_error, m.root_mean_squared_error
        ),
        None => println!("Held out:   (no rows)"),
    }
    if let Some(ckpt) = &report.checkpoint_path {
        println!("Checkpoint: {}", ckpt.display());
    }
    println!("Artifact:   {} bytes", report.artifact_bytes);
    println!("Checksum:   {:016x}", report.checksum);
    if let Some(digest) = &report.digest {
        println!("BLAKE3:     {}", digest);
    }
    if let Some(v) = &version {
        println!("Version:    {}", v.version);
    }
    println!();
    println!("{}", report.completion_message());

    Ok(())
}

// =============================================================================
// INSPECT COMMAND
// =============================================================================

/// Show the signature and metadata of an ONNX model.
pub fn cmd_inspect(model_path: &Path, json_mode: bool) -> Result<(), PickestError> {
    let validated = validate_file_path(model_path)?;
    let model = OnnxModel::from_path(&validated)?;

    let feature_order_ok = match model.feature_columns() {
        Some(cols) => {
            let ok = cols.iter().map(String::as_str).eq(FEATURE_COLUMNS);
            if !ok {
                tracing::warn!(
                    recorded = %cols.join(","),
                    expected = %FEATURE_COLUMNS.join(","),
                    "Model feature order differs from the training order"
                );
            }
            Some(ok)
        }
        None => {
            tracing::warn!("Model does not record its feature order");
            None
        }
    };

    if json_mode {
        let signature = |s: &pickest_core::TensorSignature| {
            serde_json::json!({
                "name": s.name,
                "elem_type": s.elem_type_name(),
                "shape": s.shape,
            })
        };
        let output = serde_json::json!({
            "model": validated.to_string_lossy(),
            "ir_version": model.ir_version(),
            "producer": model.producer(),
            "opsets": model.opsets().iter()
                .map(|(d, v)| serde_json::json!({ "domain": d, "version": v }))
                .collect::<Vec<_>>(),
            "inputs": model.inputs().iter().map(signature).collect::<Vec<_>>(),
            "outputs": model.outputs().iter().map(signature).collect::<Vec<_>>(),
            "trees": model.tree_count(),
            "aggregate": model.aggregate().as_str(),
            "metadata": model.metadata(),
            "feature_order_ok": feature_order_ok,
        });
        print_json(&output);
        return Ok(());
    }

    println!("ONNX Model");
    println!("==========");
    println!("File:       {}", validated.display());
    println!("IR version: {}", model.ir_version());
    println!("Producer:   {}", model.producer());
    for (domain, version) in model.opsets() {
        let domain = if domain.is_empty() { "ai.onnx" } else { domain.as_str() };
        println!("Opset:      {} v{}", domain, version);
    }
    println!();
    for input in model.inputs() {
        println!("Input:      {}", input);
    }
    for output in model.outputs() {
        println!("Output:     {}", output);
    }
    println!(
        "Ensemble:   {} trees, {}",
        model.tree_count(),
        model.aggregate().as_str()
    );
    if !model.metadata().is_empty() {
        println!();
        println!("Metadata:");
        for (key, value) in model.metadata() {
            println!("  {}: {}", key, value);
        }
    }

    Ok(())
}

// =============================================================================
// PREDICT COMMAND
// =============================================================================

/// Score one feature vector.
pub fn cmd_predict(
    model_path: &Path,
    features: &[f32],
    validate: bool,
    json_mode: bool,
) -> Result<(), PickestError> {
    let x = feature_vector(features)?;
    if validate {
        validate_features(&x)?;
    }

    let validated = validate_file_path(model_path)?;
    let model = OnnxModel::from_path(&validated)?;
    let minutes = model.predict(&x)?;
    tracing::debug!(?x, minutes, "Prediction");

    if json_mode {
        let output = serde_json::json!({
            "features": FEATURE_COLUMNS.iter().zip(x.iter())
                .map(|(name, value)| (name.to_string(), serde_json::json!(value)))
                .collect::<serde_json::Map<_, _>>(),
            "picking_time": minutes,
        });
        print_json(&output);
        return Ok(());
    }

    println!("Estimated picking time: {:.2} minutes", minutes);
    Ok(())
}

// =============================================================================
// VERSIONS COMMAND
// =============================================================================

/// List recorded model versions, newest first.
pub fn cmd_versions(ledger: &VersionLedger, json_mode: bool) -> Result<(), PickestError> {
    let entries = ledger.load();

    if json_mode {
        print_json(&serde_json::json!(entries));
        return Ok(());
    }

    println!("Model Versions ({})", ledger.ledger_path().display());
    println!("==============");
    if entries.is_empty() {
        println!("No versions recorded. Export with --register to record one.");
        return Ok(());
    }

    let metric = |m: Option<f64>| m.map_or_else(|| "-".to_string(), |v| format!("{:.4}", v));
    println!(
        "{:<18} {:<22} {:>8} {:>8} {:>8}",
        "VERSION", "TIMESTAMP", "R2", "MAE", "RMSE"
    );
    for e in &entries {
        println!(
            "{:<18} {:<22} {:>8} {:>8} {:>8}",
            e.version,
            e.timestamp,
            metric(e.r_squared),
            metric(e.mae),
            metric(e.rmse)
        );
    }

    Ok(())
}

// =============================================================================
// DRIFT COMMAND
// =============================================================================

/// Compare the feature means of a batch with the means the model was
/// trained on.
pub fn cmd_drift(
    model_path: &Path,
    data_path: &Path,
    threshold_percent: f64,
    json_mode: bool,
) -> Result<DriftReport, PickestError> {
    let validated_model = validate_file_path(model_path)?;
    let validated_data = validate_file_path(data_path)?;

    let model = OnnxModel::from_path(&validated_model)?;
    let baseline = model.training_means()?.ok_or_else(|| {
        PickestError::InvalidModel(format!(
            "'{}' does not record training means; export it again",
            model_path.display()
        ))
    })?;

    let rows = read_features(&validated_data)?;
    let live = feature_means(&rows).ok_or(PickestError::EmptyDataset)?;
    let report = drift::evaluate(&baseline, &live, threshold_percent)?;

    if report.alarm {
        let drifted: Vec<&str> = report.drifted().map(|(name, _)| name).collect();
        tracing::warn!(
            features = %drifted.join(","),
            threshold = report.threshold_percent,
            "Feature drift at or above threshold"
        );
    } else {
        tracing::info!(rows = rows.len(), "No feature drift");
    }

    if json_mode {
        let output = serde_json::json!({
            "model": validated_model.to_string_lossy(),
            "data": validated_data.to_string_lossy(),
            "rows": rows.len(),
            "features": FEATURE_COLUMNS,
            "drift": report,
        });
        print_json(&output);
        return Ok(report);
    }

    println!("Feature Drift ({} rows)", rows.len());
    println!("=============");
    println!(
        "{:<18} {:>12} {:>12} {:>9}",
        "FEATURE", "TRAINING", "LIVE", "DRIFT %"
    );
    for (i, name) in FEATURE_COLUMNS.iter().enumerate() {
        let mark = if report.ratios[i] >= report.threshold_percent {
            " !"
        } else {
            ""
        };
        println!(
            "{:<18} {:>12.4} {:>12.4} {:>9.2}{}",
            name, report.baseline[i], report.live[i], report.ratios[i], mark
        );
    }
    println!();
    if report.alarm {
        println!(
            "Drift alarm: one or more features moved by {}% or more",
            report.threshold_percent
        );
    } else {
        println!("No drift detected (threshold {}%)", report.threshold_percent);
    }

    Ok(report)
}
