//! CLI command implementations

mod inspect;
mod quantize;


use crate::cli::LogLevel;
use crate::config::{Cli, Command};

/// Execute a CLI command based on the parsed arguments
pub fn run_command(cli: Cli) -> Result<(), String> {
    let log_level = LogLevel::from_flags(cli.quiet, cli.verbose);

    match cli.command {
        Command::Quantize(args) => quantize::run_quantize(args, log_level),
        Command::Inspect(args) => inspect::run_inspect(args, log_level),
    }
}
