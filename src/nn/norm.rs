//! RMS normalization layer.

use crate::error::{Error, Result};
use crate::tensor::{ops, Tensor};

pub const DEFAULT_RMS_NORM_EPS: f32 = 1e-6;

#[derive(Debug, Clone, PartialEq)]
pub struct RmsNorm {
    weight: Tensor,
    eps: f32,
}

impl RmsNorm {
    /// Create an RMS norm from a 1-D gain vector.
    pub fn new(weight: Tensor, eps: f32) -> Result<Self> {
        if weight.ndim() != 1 {
            return Err(Error::shape_mismatch("rms_norm weight rank", &[1], weight.shape()));
        }
        Ok(Self { weight, eps })
    }

    /// Get the gain vector.
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Get the epsilon.
    pub fn eps(&self) -> f32 {
        self.eps
    }

    /// Normalize over the last dimension and apply the gain.
    pub fn forward(&self, x: &Tensor) -> Result<Tensor> {
        ops::rms_norm(x, &self.weight, self.eps)
    }
}
