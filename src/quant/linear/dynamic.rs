//! FP8 linear layer with dynamically quantized activations.

use crate::error::Result;
use crate::gemm::GemmDispatcher;
use crate::nn::Linear;
use crate::quant::{per_tensor_quantize, QuantizedTensor};
use crate::tensor::Tensor;
use std::sync::Arc;

/// Linear layer whose weight is stored in FP8 and whose input is quantized
/// afresh on every call with its own per-tensor scale.
#[derive(Debug, Clone)]
pub struct DynamicQuantLinear {
    weight: Arc<QuantizedTensor>,
    bias: Option<Tensor>,
}

impl DynamicQuantLinear {
    /// Quantize the weight of a full-precision layer once.
    pub fn from_linear(linear: &Linear) -> Self {
        let (weight, _) = per_tensor_quantize(linear.weight());
        Self {
            weight: Arc::new(weight),
            bias: linear.bias().cloned(),
        }
    }

    /// Wrap an already-quantized weight, e.g. one read back from a checkpoint.
    pub fn new(weight: Arc<QuantizedTensor>, bias: Option<Tensor>) -> Self {
        Self { weight, bias }
    }

    /// Get the shared FP8 weight.
    pub fn weight(&self) -> &Arc<QuantizedTensor> {
        &self.weight
    }

    /// Get the weight scale.
    pub fn weight_scale(&self) -> f32 {
        self.weight.scale
    }

    /// Get the bias, if any.
    pub fn bias(&self) -> Option<&Tensor> {
        self.bias.as_ref()
    }

    /// Quantize `x` with a fresh per-call scale and run the FP8 GEMM.
    pub fn forward(&self, x: &Tensor, gemm: &GemmDispatcher) -> Result<Tensor> {
        let (qx, _) = per_tensor_quantize(x);
        gemm.gemm(&qx, &self.weight, self.bias.as_ref(), x.dtype())
    }
}
