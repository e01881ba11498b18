//! Hugging Face style `config.json` for decoder-only models.

use crate::error::{Error, Result};
use crate::nn::{Activation, DEFAULT_RMS_NORM_EPS, DEFAULT_ROPE_THETA};
use crate::pipeline::ActivationScheme;
use crate::tensor::DType;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// `quantization_config` entry written next to a quantized checkpoint.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuantizationDescriptor {
    /// Always `"fp8"`.
    pub quant_method: String,
    /// Activation scheme, `static` or `dynamic`.
    pub scheme: ActivationScheme,
}

impl QuantizationDescriptor {
    /// Descriptor for FP8 per-tensor quantization under `scheme`.
    pub fn fp8(scheme: ActivationScheme) -> Self {
        Self {
            quant_method: "fp8".to_string(),
            scheme,
        }
    }
}

fn default_rms_norm_eps() -> f32 {
    DEFAULT_RMS_NORM_EPS
}

fn default_rope_theta() -> f32 {
    DEFAULT_ROPE_THETA
}

fn default_hidden_act() -> String {
    "silu".to_string()
}

/// Model configuration.
///
/// Fields not used here are kept in `extra` and written back unchanged.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Hidden dimension (embedding size)
    pub hidden_size: usize,
    /// Feed-forward network intermediate dimension
    pub intermediate_size: usize,
    /// Number of decoder layers
    pub num_hidden_layers: usize,
    /// Number of attention heads
    pub num_attention_heads: usize,
    /// Number of key-value heads (grouped-query attention); defaults to `num_attention_heads`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub num_key_value_heads: Option<usize>,
    /// Vocabulary size
    pub vocab_size: usize,
    /// RMS normalization epsilon
    #[serde(default = "default_rms_norm_eps")]
    pub rms_norm_eps: f32,
    /// RoPE theta base
    #[serde(default = "default_rope_theta")]
    pub rope_theta: f32,
    /// MLP activation name
    #[serde(default = "default_hidden_act")]
    pub hidden_act: String,
    /// Bias on the q/k/v/o projections
    #[serde(default)]
    pub attention_bias: bool,
    /// Bias on the MLP projections
    #[serde(default)]
    pub mlp_bias: bool,
    /// `lm_head` shares the embedding matrix
    #[serde(default)]
    pub tie_word_embeddings: bool,
    /// Checkpoint dtype, e.g. `bfloat16`
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub torch_dtype: Option<String>,
    /// End-of-sequence token(s); an integer or a list
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub eos_token_id: Option<serde_json::Value>,
    /// Quantization applied to the checkpoint
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantization_config: Option<QuantizationDescriptor>,
    /// Remaining fields, preserved verbatim
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ModelConfig {
    /// Small configuration for tests and synthetic runs.
    pub fn tiny() -> Self {
        Self {
            hidden_size: 32,
            intermediate_size: 64,
            num_hidden_layers: 2,
            num_attention_heads: 4,
            num_key_value_heads: Some(2),
            vocab_size: 128,
            rms_norm_eps: DEFAULT_RMS_NORM_EPS,
            rope_theta: DEFAULT_ROPE_THETA,
            hidden_act: default_hidden_act(),
            attention_bias: false,
            mlp_bias: false,
            tie_word_embeddings: false,
            torch_dtype: Some("float32".to_string()),
            eos_token_id: Some(serde_json::json!(2)),
            quantization_config: None,
            extra: serde_json::Map::new(),
        }
    }

    /// Read `config.json` from a model directory (or a direct file path).
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = if path.is_dir() {
            path.join("config.json")
        } else {
            path.to_path_buf()
        };
        let content = std::fs::read_to_string(&file)
            .map_err(|e| Error::ConfigError(format!("Failed to read {}: {e}", file.display())))?;
        let config: Self = serde_json::from_str(&content)
            .map_err(|e| Error::ConfigError(format!("Failed to parse {}: {e}", file.display())))?;
        config.validate()?;
        Ok(config)
    }

    /// Check head counts, divisibility, activation name and dtype.
    pub fn validate(&self) -> Result<()> {
        if self.hidden_size == 0 || self.num_attention_heads == 0 || self.vocab_size == 0 {
            return Err(Error::ConfigError(
                "hidden_size, num_attention_heads and vocab_size must be > 0".into(),
            ));
        }
        if self.hidden_size % self.num_attention_heads != 0 {
            return Err(Error::ConfigError(format!(
                "hidden_size {} is not divisible by num_attention_heads {}",
                self.hidden_size, self.num_attention_heads
            )));
        }
        let kv = self.num_kv_heads();
        if kv == 0 || self.num_attention_heads % kv != 0 {
            return Err(Error::ConfigError(format!(
                "num_attention_heads {} is not a multiple of num_key_value_heads {kv}",
                self.num_attention_heads
            )));
        }
        self.activation()?;
        self.dtype()?;
        Ok(())
    }

    /// Get the number of key/value heads (defaults to attention heads).
    pub fn num_kv_heads(&self) -> usize {
        self.num_key_value_heads.unwrap_or(self.num_attention_heads)
    }

    /// Get the per-head dimension.
    pub fn head_dim(&self) -> usize {
        self.hidden_size / self.num_attention_heads
    }

    /// Parse `hidden_act` into an [`Activation`].
    pub fn activation(&self) -> Result<Activation> {
        self.hidden_act.parse()
    }

    /// Checkpoint dtype, `float32` when unspecified.
    pub fn dtype(&self) -> Result<DType> {
        self.torch_dtype
            .as_deref()
            .map_or(Ok(DType::F32), str::parse)
    }

    /// First EOS token id; used as the calibration pad token.
    pub fn eos_token(&self) -> Option<u32> {
        let value = self.eos_token_id.as_ref()?;
        let id = match value {
            serde_json::Value::Array(ids) => ids.first()?.as_u64()?,
            other => other.as_u64()?,
        };
        u32::try_from(id).ok()
    }
}
