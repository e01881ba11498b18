//! Decoder model loading
//!
//! Hugging Face style checkpoints (`config.json` + SafeTensors) are turned
//! into a [`CausalLm`]: a [`ModelGraph`](crate::graph::ModelGraph) holding the
//! decoder, plus an unquantized output head.

mod builder;
mod causal_lm;
mod config;
mod weights;

#[cfg(test)]
mod tests;

pub use builder::{build_decoder, synthetic_weights};
pub use causal_lm::CausalLm;
pub use config::{ModelConfig, QuantizationDescriptor};
pub use weights::{
    find_safetensors_files, load_safetensors, save_checkpoint, tensor_from_view, tensor_to_bytes,
};
