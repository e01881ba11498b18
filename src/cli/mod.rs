//! CLI module for cuantizar
//!
//! Command handlers and user-facing output.

mod commands;
mod logging;

pub use commands::run_command;
pub use logging::LogLevel;

// Re-export Cli from config for convenience
pub use crate::config::Cli;
