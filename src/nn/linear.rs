//! Full-precision affine layer.

use crate::error::{Error, Result};
use crate::tensor::{ops, Tensor};

/// `y = x Wᵀ + b` with `W: [out_features, in_features]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Linear {
    weight: Tensor,
    bias: Option<Tensor>,
}

impl Linear {
    /// Create a linear layer from a `[out, in]` weight and optional `[out]` bias.
    pub fn new(weight: Tensor, bias: Option<Tensor>) -> Result<Self> {
        if weight.ndim() != 2 {
            return Err(Error::shape_mismatch("linear weight rank", &[2], weight.shape()));
        }
        if let Some(b) = &bias {
            let out = weight.shape()[0];
            if b.shape() != [out] {
                return Err(Error::shape_mismatch("linear bias", &[out], b.shape()));
            }
        }
        Ok(Self { weight, bias })
    }

    /// Get the weight matrix.
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Get the bias, if any.
    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    /// Get the input width.
    pub fn in_features(&self) -> usize {
        self.weight.shape()[1]
    }

    /// Get the output width.
    pub fn out_features(&self) -> usize {
        self.weight.shape()[0]
    }

    /// Output keeps the input dtype.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        ops::linear(x, &self.weight, self.bias.as_ref(), x.dtype())
    }
}
