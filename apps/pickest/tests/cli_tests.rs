//! Tests for argument parsing, config layering and the commands.

use clap::Parser;
use pickest::cli::{
    Cli, Commands, ExportArgs, cmd_drift, cmd_export, cmd_inspect, cmd_predict, cmd_versions,
};
use pickest::config::{FileConfig, resolve};
use pickest_core::PickestError;
use std::fmt::Write as _;
use std::path::{Path, PathBuf};

fn parse(args: &[&str]) -> Cli {
    Cli::try_parse_from(args).expect("valid arguments")
}

fn write_csv(path: &Path, rows: usize) {
    let mut csv =
        String::from("ItemCount,Weight,Volume,Distance,PickerExperience,StockDensity,PickingTime\n");
    for i in 0..rows {
        let items = (i % 12) + 1;
        let distance = (i % 8) as f32 * 5.0;
        writeln!(
            csv,
            "{},1.5,0.5,{},{},0.5,{}",
            items,
            distance,
            (i % 10) + 1,
            items as f32 + distance * 0.1
        )
        .expect("format");
    }
    std::fs::write(path, csv).expect("write csv");
}

// =============================================================================
// PARSING
// =============================================================================

#[test]
fn no_subcommand_means_export() {
    let cli = parse(&["pickest"]);
    assert!(cli.command.is_none());
    assert!(cli.config.is_none());
    assert!(!cli.json_mode);
}

#[test]
fn export_flags_parsed() {
    let cli = parse(&[
        "pickest",
        "export",
        "-d",
        "jobs.csv",
        "-o",
        "out.onnx",
        "--no-checkpoint",
        "--test-fraction",
        "0.25",
        "--seed",
        "7",
        "--trees",
        "10",
        "--max-depth",
        "6",
        "--register",
    ]);
    let Some(Commands::Export(args)) = cli.command else {
        unreachable!("export expected");
    };
    assert_eq!(args.data, Some(PathBuf::from("jobs.csv")));
    assert_eq!(args.output, Some(PathBuf::from("out.onnx")));
    assert!(args.no_checkpoint);
    assert_eq!(args.test_fraction, Some(0.25));
    assert_eq!(args.seed, Some(7));
    assert_eq!(args.trees, Some(10));
    assert_eq!(args.max_depth, Some(6));
    assert!(args.register);
}

#[test]
fn checkpoint_flags_conflict() {
    let result = Cli::try_parse_from([
        "pickest",
        "export",
        "--checkpoint",
        "a.ckpt",
        "--no-checkpoint",
    ]);
    assert!(result.is_err());
}

#[test]
fn predict_features_comma_separated() {
    let cli = parse(&["pickest", "predict", "-f", "10,5.0,2.0,3.5,1,0.8", "--no-validate"]);
    let Some(Commands::Predict {
        model,
        features,
        no_validate,
    }) = cli.command
    else {
        unreachable!("predict expected");
    };
    assert_eq!(model, PathBuf::from("model.onnx"));
    assert_eq!(features, vec![10.0, 5.0, 2.0, 3.5, 1.0, 0.8]);
    assert!(no_validate);
}

#[test]
fn predict_accepts_negative_values() {
    let cli = parse(&["pickest", "predict", "--features", "-1,0,0,0,1,0"]);
    let Some(Commands::Predict { features, .. }) = cli.command else {
        unreachable!("predict expected");
    };
    assert_eq!(features[0], -1.0);
}

#[test]
fn drift_threshold_defaults_to_twenty() {
    let cli = parse(&["pickest", "drift", "-d", "live.csv"]);
    let Some(Commands::Drift {
        model,
        data,
        threshold,
    }) = cli.command
    else {
        unreachable!("drift expected");
    };
    assert_eq!(model, PathBuf::from("model.onnx"));
    assert_eq!(data, PathBuf::from("live.csv"));
    assert_eq!(threshold, 20.0);

    let cli = parse(&["pickest", "drift", "-d", "live.csv", "--threshold", "35"]);
    assert!(matches!(cli.command, Some(Commands::Drift { threshold, .. }) if threshold == 35.0));
}

#[test]
fn global_flags_after_subcommand() {
    let cli = parse(&["pickest", "versions", "--json-mode", "-q", "-c", "alt.toml"]);
    assert!(cli.json_mode);
    assert!(cli.quiet);
    assert_eq!(cli.config, Some(PathBuf::from("alt.toml")));
}

// =============================================================================
// CONFIG LAYERING
// =============================================================================

#[test]
fn defaults_without_file_or_flags() {
    let settings = resolve(&FileConfig::default(), &ExportArgs::default());
    assert_eq!(settings.export, pickest_core::ExportConfig::default());
    assert!(settings.ledger.is_none());
}

#[test]
fn file_overrides_defaults_and_flags_override_file() {
    let file = FileConfig::parse(
        r#"
        [data]
        path = "from_file.csv"

        [split]
        test_fraction = 0.3
        seed = 1

        [forest]
        n_estimators = 50
        max_depth = 4

        [output]
        write_checkpoint = false

        [registry]
        enabled = true
        retention = 3
        "#,
        Path::new("pickest.toml"),
    )
    .expect("parse");

    let from_file = resolve(&file, &ExportArgs::default());
    assert_eq!(from_file.export.data_path, PathBuf::from("from_file.csv"));
    assert_eq!(from_file.export.test_fraction, 0.3);
    assert_eq!(from_file.export.split_seed, 1);
    assert_eq!(from_file.export.forest.n_estimators, 50);
    assert_eq!(from_file.export.forest.max_depth, Some(4));
    assert_eq!(from_file.export.forest.seed, 42);
    assert!(from_file.export.checkpoint_path.is_none());
    assert_eq!(from_file.ledger.as_ref().map(|l| l.retention()), Some(3));

    let flags = ExportArgs {
        data: Some(PathBuf::from("from_flag.csv")),
        checkpoint: Some(PathBuf::from("flag.ckpt")),
        seed: Some(9),
        trees: Some(5),
        ..ExportArgs::default()
    };
    let merged = resolve(&file, &flags);
    assert_eq!(merged.export.data_path, PathBuf::from("from_flag.csv"));
    assert_eq!(merged.export.checkpoint_path, Some(PathBuf::from("flag.ckpt")));
    assert_eq!(merged.export.split_seed, 9);
    assert_eq!(merged.export.forest.seed, 9);
    assert_eq!(merged.export.forest.n_estimators, 5);
    assert_eq!(merged.export.test_fraction, 0.3);
}

// =============================================================================
// COMMANDS
// =============================================================================

#[test]
fn export_then_inspect_predict_and_list() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = dir.path().join("picking_data.csv");
    let model = dir.path().join("model.onnx");
    write_csv(&data, 40);

    let file = FileConfig::parse(
        &format!(
            "[registry]\nledger = {:?}\narchive_dir = {:?}\n",
            dir.path().join("versions.json"),
            dir.path().join("archive")
        ),
        Path::new("pickest.toml"),
    )
    .expect("parse");
    let args = ExportArgs {
        data: Some(data),
        output: Some(model.clone()),
        no_checkpoint: true,
        trees: Some(5),
        register: true,
        ..ExportArgs::default()
    };

    cmd_export(&file, &args, true).expect("export");
    assert!(model.exists());
    assert!(!dir.path().join("picking_model.ckpt").exists());

    cmd_inspect(&model, true).expect("inspect");
    cmd_predict(&model, &[10.0, 5.0, 2.0, 3.5, 1.0, 0.8], true, false).expect("predict");

    let ledger = file.ledger();
    assert_eq!(ledger.load().len(), 1);
    cmd_versions(&ledger, false).expect("versions");
}

#[test]
fn predict_rejects_out_of_range_before_loading() {
    let err = cmd_predict(
        Path::new("missing.onnx"),
        &[0.0, 5.0, 2.0, 3.5, 1.0, 0.8],
        true,
        false,
    )
    .expect_err("invalid input");
    assert!(matches!(err, PickestError::InvalidInput(_)));
}

#[test]
fn predict_rejects_wrong_width() {
    let err = cmd_predict(Path::new("model.onnx"), &[1.0, 2.0], false, false)
        .expect_err("two values");
    assert!(matches!(err, PickestError::InvalidInput(_)));
}

#[test]
fn export_missing_dataset_fails() {
    let dir = tempfile::tempdir().expect("tempdir");
    let args = ExportArgs {
        data: Some(dir.path().join("nope.csv")),
        output: Some(dir.path().join("model.onnx")),
        ..ExportArgs::default()
    };
    let err = cmd_export(&FileConfig::default(), &args, false).expect_err("missing data");
    assert!(matches!(err, PickestError::IoError(_)));
    assert!(!dir.path().join("model.onnx").exists());
}

#[test]
fn drift_against_exported_model() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = dir.path().join("picking_data.csv");
    let model = dir.path().join("model.onnx");
    write_csv(&data, 40);

    let args = ExportArgs {
        data: Some(data.clone()),
        output: Some(model.clone()),
        no_checkpoint: true,
        trees: Some(3),
        ..ExportArgs::default()
    };
    cmd_export(&FileConfig::default(), &args, true).expect("export");

    // A very high threshold cannot alarm on a sample of the training data.
    let stable = cmd_drift(&model, &data, 1000.0, true).expect("drift");
    assert!(!stable.alarm);

    // Live batches need no target column.
    let shifted = dir.path().join("live.csv");
    let mut csv =
        String::from("ItemCount,Weight,Volume,Distance,PickerExperience,StockDensity\n");
    for i in 0..10 {
        writeln!(csv, "{},1.5,0.5,{},5,0.5", 40 + i, 100 + i).expect("format");
    }
    std::fs::write(&shifted, csv).expect("write live csv");

    let report = cmd_drift(&model, &shifted, 20.0, false).expect("drift");
    assert!(report.alarm);
    let drifted: Vec<&str> = report.drifted().map(|(name, _)| name).collect();
    assert!(drifted.contains(&"ItemCount"));
    assert!(drifted.contains(&"Distance"));
    assert!(!drifted.contains(&"Weight"));
}

#[test]
fn drift_needs_recorded_means() {
    let dir = tempfile::tempdir().expect("tempdir");
    let data = dir.path().join("picking_data.csv");
    write_csv(&data, 20);

    let dataset = pickest_core::Dataset::from_path(&data).expect("load");
    let forest = pickest_core::RandomForest::fit(
        &dataset,
        pickest_core::ForestParams {
            n_estimators: 2,
            ..pickest_core::ForestParams::default()
        },
    )
    .expect("fit");
    let model = dir.path().join("bare.onnx");
    let bytes = pickest_core::export_onnx(&forest, &pickest_core::OnnxExportOptions::default());
    std::fs::write(&model, bytes).expect("write model");

    let err = cmd_drift(&model, &data, 20.0, true).expect_err("no baseline");
    assert!(matches!(err, PickestError::InvalidModel(_)));
}
