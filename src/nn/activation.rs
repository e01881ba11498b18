//! Pointwise activation functions.

use crate::error::Error;
use crate::tensor::{ops, Tensor};
use serde::{Deserialize, Serialize};
use std::str::FromStr;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum Activation {
    #[default]
    Silu,
    Relu,
    Gelu,
}

impl Activation {
    /// Apply the activation elementwise.
    pub fn apply(&self, x: &Tensor) -> Tensor {
        match self {
            Activation::Silu => x.map(ops::silu),
            Activation::Relu => x.map(|v| v.max(0.0)),
            Activation::Gelu => x.map(ops::gelu),
        }
    }
}

impl FromStr for Activation {
    type Err = Error;

    /// Accepts the `hidden_act` names found in HF configs.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "silu" | "swish" => Ok(Activation::Silu),
            "relu" => Ok(Activation::Relu),
            "gelu" | "gelu_new" | "gelu_pytorch_tanh" => Ok(Activation::Gelu),
            _ => Err(Error::ConfigError(format!(
                "Unknown activation: {s}. Valid activations: silu, relu, gelu"
            ))),
        }
    }
}
