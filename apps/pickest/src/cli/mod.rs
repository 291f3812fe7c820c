//! # Pickest CLI Module
//!
//! This module implements the CLI interface for Pickest.
//!
//! ## Available Commands
//!
//! - `export` - Train on the picking dataset and write `model.onnx` (default)
//! - `inspect` - Show the signature and metadata of an ONNX model
//! - `predict` - Score one feature vector with an ONNX model
//! - `versions` - List recorded model versions
//! - `drift` - Compare a batch of jobs with the model's training data

mod commands;

use clap::{Args, Parser, Subcommand};
use pickest_core::PickestError;
use pickest_core::primitives::DEFAULT_DRIFT_THRESHOLD;
use std::path::PathBuf;

pub use commands::*;

// =============================================================================
// CLI STRUCTURE
// =============================================================================

/// Pickest - picking-time model exporter
///
/// Fits a random forest on warehouse picking jobs and exports it as ONNX.
#[derive(Parser, Debug)]
#[command(name = "pickest")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose (debug) logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress banner output
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Config file (default: ./pickest.toml when present)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Output in JSON format (for programmatic access)
    #[arg(long, global = true)]
    pub json_mode: bool,

    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Option<Commands>,
}

/// Available CLI commands.
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Train the forest and export it as ONNX
    Export(ExportArgs),

    /// Show the signature and metadata of an ONNX model
    Inspect {
        /// ONNX model file
        #[arg(short, long, default_value = "model.onnx")]
        model: PathBuf,
    },

    /// Predict the picking time for one job
    Predict {
        /// ONNX model file
        #[arg(short, long, default_value = "model.onnx")]
        model: PathBuf,

        /// Six comma-separated values: ItemCount,Weight,Volume,Distance,PickerExperience,StockDensity
        #[arg(short, long, value_delimiter = ',', allow_hyphen_values = true, required = true)]
        features: Vec<f32>,

        /// Skip the range checks on the features
        #[arg(long)]
        no_validate: bool,
    },

    /// List recorded model versions
    Versions,

    /// Compare the feature means of a batch with the model's training data
    Drift {
        /// ONNX model file
        #[arg(short, long, default_value = "model.onnx")]
        model: PathBuf,

        /// CSV batch with the six feature columns
        #[arg(short, long)]
        data: PathBuf,

        /// Alarm threshold, in percent of the training mean
        #[arg(short, long, default_value_t = DEFAULT_DRIFT_THRESHOLD)]
        threshold: f64,
    },
}

/// Flags of the export command. Unset flags fall back to the config file.
#[derive(Args, Debug, Clone, Default, PartialEq)]
pub struct ExportArgs {
    /// CSV dataset [default: picking_data.csv]
    #[arg(short, long)]
    pub data: Option<PathBuf>,

    /// ONNX output file [default: model.onnx]
    #[arg(short, long)]
    pub output: Option<PathBuf>,

    /// Native checkpoint file [default: picking_model.ckpt]
    #[arg(long, conflicts_with = "no_checkpoint")]
    pub checkpoint: Option<PathBuf>,

    /// Do not write the native checkpoint
    #[arg(long)]
    pub no_checkpoint: bool,

    /// Fraction of rows held out for evaluation [default: 0.2]
    #[arg(long)]
    pub test_fraction: Option<f64>,

    /// Seed for the split and the forest [default: 42]
    #[arg(long)]
    pub seed: Option<u64>,

    /// Number of trees [default: 100]
    #[arg(long)]
    pub trees: Option<usize>,

    /// Maximum tree depth [default: unlimited]
    #[arg(long)]
    pub max_depth: Option<usize>,

    /// Record the export in the version ledger
    #[arg(long)]
    pub register: bool,
}

// =============================================================================
// COMMAND EXECUTION
// =============================================================================

/// Execute the CLI with parsed arguments.
pub fn execute(cli: Cli) -> Result<(), PickestError> {
    let file = crate::config::load(cli.config.as_deref())?;
    let json_mode = cli.json_mode;

    match cli.command {
        Some(Commands::Export(args)) => cmd_export(&file, &args, json_mode),
        Some(Commands::Inspect { model }) => cmd_inspect(&model, json_mode),
        Some(Commands::Predict {
            model,
            features,
            no_validate,
        }) => cmd_predict(&model, &features, !no_validate, json_mode),
        Some(Commands::Versions) => cmd_versions(&file.ledger(), json_mode),
        Some(Commands::Drift {
            model,
            data,
            threshold,
        }) => cmd_drift(&model, &data, threshold, json_mode).map(|_| ()),
        None => {
            // No subcommand - run the export with file and default settings
            cmd_export(&file, &ExportArgs::default(), json_mode)
        }
    }
}
