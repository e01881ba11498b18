//! Full-precision decoder building blocks
//!
//! These are the leaves of a [`ModelGraph`](crate::graph::ModelGraph) before
//! quantization: embeddings, RMS norms, activations and [`Linear`] layers,
//! plus the attention kernel used by attention containers.

mod activation;
pub mod attention;
mod embedding;
mod linear;
mod norm;

pub use activation::Activation;
pub use attention::{causal_attention, AttentionShape, DEFAULT_ROPE_THETA};
pub use embedding::Embedding;
pub use linear::Linear;
pub use norm::{RmsNorm, DEFAULT_RMS_NORM_EPS};
