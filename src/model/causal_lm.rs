//! Decoder plus output head.

use super::builder::{build_decoder, synthetic_weights};
use super::weights::load_safetensors;
use super::ModelConfig;
use crate::error::{Error, Result};
use crate::gemm::GemmDispatcher;
use crate::graph::{ModelGraph, Module};
use crate::nn::Linear;
use crate::tensor::Tensor;
use std::collections::HashMap;
use std::path::Path;

const DECODER_PREFIX: &str = "model.";

/// Causal language model: a decoder graph followed by `lm_head`.
///
/// Only the decoder graph is subject to quantization. `lm_head` stays in the
/// checkpoint dtype.
#[derive(Debug, Clone)]
pub struct CausalLm {
    config: ModelConfig,
    decoder: ModelGraph,
    lm_head: Linear,
    tied: bool,
}

impl CausalLm {
    /// Assemble a model from a flat map of checkpoint tensors.
    ///
    /// Decoder tensors may carry the `model.` prefix. Unknown tensors are
    /// ignored with a warning.
    pub fn from_weights(config: ModelConfig, weights: HashMap<String, Tensor>) -> Result<Self> {
        let mut decoder_weights: HashMap<String, Tensor> = weights
            .into_iter()
            .map(|(name, t)| match name.strip_prefix(DECODER_PREFIX) {
                Some(stripped) => (stripped.to_string(), t),
                None => (name, t),
            })
            .collect();

        let head_weight = decoder_weights.remove("lm_head.weight");
        let decoder = build_decoder(&config, &mut decoder_weights)?;

        let (lm_head, tied) = match head_weight {
            Some(w) => (Linear::new(w, None)?, false),
            None if config.tie_word_embeddings => {
                let embed = match decoder.get_submodule("embed_tokens")? {
                    Module::Embedding(e) => e.weight().clone(),
                    other => {
                        return Err(Error::InvalidGraph(format!(
                            "embed_tokens is a {}, expected an embedding",
                            other.kind()
                        )))
                    }
                };
                (Linear::new(embed, None)?, true)
            }
            None => {
                return Err(Error::MissingTensor {
                    name: "lm_head.weight".to_string(),
                })
            }
        };

        if !decoder_weights.is_empty() {
            let mut unused: Vec<&String> = decoder_weights.keys().collect();
            unused.sort();
            tracing::warn!(count = unused.len(), first = %unused[0], "ignoring unused checkpoint tensors");
        }

        Ok(Self {
            config,
            decoder,
            lm_head,
            tied,
        })
    }

    /// Load `config.json` and the SafeTensors weights from a model directory.
    pub fn from_pretrained(dir: impl AsRef<Path>) -> Result<Self> {
        let dir = dir.as_ref();
        let config = ModelConfig::from_path(dir)?;
        let weights = load_safetensors(dir)?;
        let model = Self::from_weights(config, weights)?;
        tracing::info!(
            path = %dir.display(),
            layers = model.config.num_hidden_layers,
            hidden = model.config.hidden_size,
            "loaded model"
        );
        Ok(model)
    }

    /// Model with seeded random weights.
    pub fn synthetic(config: ModelConfig, seed: u64) -> Result<Self> {
        let weights = synthetic_weights(&config, seed)?;
        Self::from_weights(config, weights)
    }

    /// Get the model config.
    pub fn config(&self) -> &ModelConfig {
        &self.config
    }

    /// Get the model config mutably.
    pub fn config_mut(&mut self) -> &mut ModelConfig {
        &mut self.config
    }

    /// Get the decoder graph.
    pub fn decoder(&self) -> &ModelGraph {
        &self.decoder
    }

    /// Get the decoder graph mutably.
    pub fn decoder_mut(&mut self) -> &mut ModelGraph {
        &mut self.decoder
    }

    /// Get the output projection.
    pub fn lm_head(&self) -> &Linear {
        &self.lm_head
    }

    /// Whether `lm_head` reuses the embedding matrix.
    pub fn is_tied(&self) -> bool {
        self.tied
    }

    /// Final hidden states for `[batch, seq]` token ids.
    pub fn hidden_states(&mut self, tokens: &Tensor, gemm: &GemmDispatcher) -> Result<Tensor> {
        if tokens.ndim() != 2 {
            return Err(Error::shape_mismatch("token ids", &[1, 0], tokens.shape()));
        }
        self.decoder.forward(tokens, gemm)
    }

    /// Logits of shape `[batch, seq, vocab]`.
    pub fn forward(&mut self, tokens: &Tensor, gemm: &GemmDispatcher) -> Result<Tensor> {
        let hidden = self.hidden_states(tokens, gemm)?;
        self.lm_head.forward(&hidden)
    }
}
