//! # cuantizar
//!
//! FP8 (E4M3) per-tensor post-training quantization for the linear layers of
//! decoder-only language models.
//!
//! ## Architecture
//!
//! - **tensor**: `f32` tensors rounded to their element type
//! - **quant**: E4M3 codec, per-tensor quantization, FP8 linear layers
//! - **gemm**: native/fallback FP8 matmul dispatch gated on compute capability
//! - **nn**: full-precision building blocks of a Llama-style decoder
//! - **graph**: path-addressed module tree and in-place rewriter
//! - **model**: checkpoint loading and decoder construction
//! - **calibration**: calibration token rows
//! - **pipeline**: quantize → calibrate → freeze, plus export
//! - **config** / **cli**: YAML spec, argument parsing, command handlers
//!
//! ## Example
//!
//! ```no_run
//! use cuantizar::calibration::{CalibrationDataConfig, CalibrationSet};
//! use cuantizar::gemm::GemmDispatcher;
//! use cuantizar::model::CausalLm;
//! use cuantizar::pipeline::{
//!     export_quantized_model, ActivationScheme, PipelineConfig, QuantizationPipeline,
//! };
//!
//! let mut model = CausalLm::from_pretrained("./llama")?;
//! let calib = CalibrationSet::load(
//!     &CalibrationDataConfig::new().with_num_samples(64),
//!     model.config().vocab_size,
//! )?;
//!
//! let mut pipeline = QuantizationPipeline::new(PipelineConfig::new(), GemmDispatcher::cpu());
//! pipeline.run(&mut model, Some(&calib))?;
//! export_quantized_model(&model, ActivationScheme::Static, pipeline.metrics(), "./llama-fp8")?;
//! # Ok::<(), cuantizar::Error>(())
//! ```

pub mod calibration;
pub mod cli;
pub mod config;
pub mod error;
pub mod gemm;
pub mod graph;
pub mod model;
pub mod nn;
pub mod pipeline;
pub mod quant;
pub mod tensor;

pub use error::{Error, Result};
pub use graph::{ModelGraph, Module, ModuleKind};
pub use model::{CausalLm, ModelConfig};
pub use pipeline::{ActivationScheme, QuantizationPipeline, QuantizationStage};
pub use quant::{per_tensor_quantize, quantize_with_scale, QuantizedTensor};
pub use tensor::{DType, Tensor};
