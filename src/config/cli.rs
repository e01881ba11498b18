//! Command-line interface

use super::spec::QuantizeSpec;
use crate::pipeline::ActivationScheme;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// cuantizar: FP8 post-training quantization
#[derive(Parser, Debug, Clone, PartialEq)]
#[command(name = "cuantizar")]
#[command(author = "PAIML")]
#[command(version)]
#[command(about = "FP8 (E4M3) per-tensor quantization for the linear layers of decoder models")]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Command,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output except errors
    #[arg(short, long, global = true)]
    pub quiet: bool,
}

/// Available commands
#[derive(Subcommand, Debug, Clone, PartialEq)]
pub enum Command {
    /// Quantize a model directory to FP8
    Quantize(QuantizeArgs),

    /// List a model's modules by kind
    Inspect(InspectArgs),
}

/// Arguments for the quantize command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct QuantizeArgs {
    /// Directory with config.json and SafeTensors weights
    #[arg(value_name = "MODEL_DIR")]
    pub model: PathBuf,

    /// Output directory for the quantized checkpoint
    #[arg(short, long)]
    pub save_dir: Option<PathBuf>,

    /// Number of calibration samples
    #[arg(short, long)]
    pub num_samples: Option<usize>,

    /// Calibration sequence length
    #[arg(long)]
    pub max_seq_len: Option<usize>,

    /// Activation scheme (static or dynamic)
    #[arg(long)]
    pub scheme: Option<ActivationScheme>,

    /// JSON file of token-id rows used for calibration
    #[arg(long)]
    pub calibration_data: Option<PathBuf>,

    /// Compute capability to dispatch for, e.g. 9.0
    #[arg(long)]
    pub compute_capability: Option<String>,

    /// Random seed for calibration sample selection
    #[arg(long)]
    pub seed: Option<u64>,

    /// YAML quantization spec; command-line flags take precedence
    #[arg(short, long)]
    pub config: Option<PathBuf>,
}

/// Arguments for the inspect command
#[derive(Parser, Debug, Clone, PartialEq)]
pub struct InspectArgs {
    /// Directory with config.json and SafeTensors weights
    #[arg(value_name = "MODEL_DIR")]
    pub model: PathBuf,

    /// List every module path, not just the counts
    #[arg(short, long)]
    pub all: bool,
}

/// Parse CLI arguments from a string slice (for testing)
pub fn parse_args<I, T>(args: I) -> Result<Cli, clap::Error>
where
    I: IntoIterator<Item = T>,
    T: Into<std::ffi::OsString> + Clone,
{
    Cli::try_parse_from(args)
}

/// Apply command-line overrides to a QuantizeSpec
pub fn apply_overrides(spec: &mut QuantizeSpec, args: &QuantizeArgs) {
    spec.model.path = args.model.clone();
    if let Some(dir) = &args.save_dir {
        spec.output.dir = Some(dir.clone());
    }
    if let Some(n) = args.num_samples {
        spec.calibration.num_samples = n;
    }
    if let Some(len) = args.max_seq_len {
        spec.calibration.max_seq_len = len;
    }
    if let Some(scheme) = args.scheme {
        spec.quantization.scheme = scheme;
    }
    if let Some(data) = &args.calibration_data {
        spec.calibration.data = Some(data.clone());
    }
    if let Some(cap) = &args.compute_capability {
        spec.quantization.compute_capability = Some(cap.clone());
    }
    if let Some(seed) = args.seed {
        spec.calibration.seed = seed;
    }
}
