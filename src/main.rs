//! cuantizar CLI
//!
//! FP8 post-training quantization entry point.
//!
//! # Usage
//!
//! ```bash
//! # Static FP8 (calibrated activation scales)
//! cuantizar quantize ./llama --save-dir ./llama-fp8
//!
//! # Dynamic activation scales, no calibration
//! cuantizar quantize ./llama --save-dir ./llama-fp8 --scheme dynamic
//!
//! # Calibrate from a token file, simulating a capable device
//! cuantizar quantize ./llama --save-dir ./out --calibration-data rows.json --compute-capability 9.0
//!
//! # List modules
//! cuantizar inspect ./llama-fp8 --all
//! ```

use clap::Parser;
use cuantizar::cli::{run_command, Cli, LogLevel};
use std::process::ExitCode;

fn init_tracing(level: LogLevel) {
    use tracing_subscriber::prelude::*;
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level.tracing_directive()));
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(LogLevel::from_flags(cli.quiet, cli.verbose));

    match run_command(cli) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}
