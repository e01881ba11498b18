//! Configuration: YAML quantization specs and CLI parsing
//!
//! # Usage
//!
//! ```bash
//! cuantizar quantize ./llama --save-dir ./llama-fp8
//! cuantizar quantize ./llama --save-dir ./llama-fp8 --scheme dynamic
//! cuantizar quantize ./llama --config quantize.yaml --num-samples 64
//! cuantizar inspect ./llama-fp8
//! ```

mod cli;
mod spec;

pub use cli::{apply_overrides, parse_args, Cli, Command, InspectArgs, QuantizeArgs};
pub use spec::{
    load_spec, CalibrationSpec, ModelRef, OutputSpec, QuantizationSpec, QuantizeSpec,
};
