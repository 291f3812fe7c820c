//! # Pickest - Picking-Time Model Exporter
//!
//! The main binary for the Pickest export engine.
//!
//! ## Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────┐
//! │            apps/pickest (THE BINARY)         │
//! │                                              │
//! │   ┌─────────────┐        ┌──────────────┐    │
//! │   │    CLI      │        │    Config    │    │
//! │   │   (clap)    │        │    (toml)    │    │
//! │   └──────┬──────┘        └──────┬───────┘    │
//! │          └───────────┬──────────┘            │
//! │                      ▼                       │
//! │              ┌──────────────┐                │
//! │              │ pickest-core │                │
//! │              │ (THE LOGIC)  │                │
//! │              └──────────────┘                │
//! └──────────────────────────────────────────────┘
//! ```
//!
//! ## Usage
//!
//! ```bash
//! # Train on picking_data.csv and write model.onnx
//! pickest
//!
//! # Explicit paths, no checkpoint, record the version
//! pickest export -d jobs.csv -o model.onnx --no-checkpoint --register
//!
//! # Check the artifact and score a job
//! pickest inspect -m model.onnx
//! pickest predict -m model.onnx -f 10,5.0,2.0,3.5,1,0.8
//!
//! # Compare a live batch with the training data
//! pickest drift -m model.onnx -d live.csv
//! ```

use clap::Parser;
use pickest::cli;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

// =============================================================================
// APPLICATION ENTRY POINT
// =============================================================================

fn main() {
    // Parse CLI arguments
    let cli = cli::Cli::parse();

    init_tracing(cli.verbose);

    // Display startup banner
    if !cli.quiet && !cli.json_mode {
        print_banner();
    }

    // Execute command
    if let Err(e) = cli::execute(cli) {
        tracing::error!("Error: {}", e);
        std::process::exit(1);
    }
}

/// Install the global subscriber. Logs go to stderr; stdout carries output.
///
/// `PICKEST_LOG_FORMAT=json` enables machine-parseable output.
fn init_tracing(verbose: bool) {
    let log_format = std::env::var("PICKEST_LOG_FORMAT").unwrap_or_else(|_| "text".to_string());

    let default_filter = if verbose {
        "pickest=debug,pickest_core=debug"
    } else {
        "pickest=info,pickest_core=info"
    };
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| default_filter.into());

    match log_format.as_str() {
        "json" => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(filter)
                .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
                .init();
        }
    }
}

/// Print the Pickest startup banner.
fn print_banner() {
    println!(
        r#"
  ┌─┐┬┌─┐┬┌─┌─┐┌─┐┌┬┐
  ├─┘││  ├┴┐├┤ └─┐ │
  ┴  ┴└─┘┴ ┴└─┘└─┘ ┴

  Picking-Time Model Exporter v{}
"#,
        env!("CARGO_PKG_VERSION")
    );
}
