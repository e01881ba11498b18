//! Calibration-time wrapper that records the activation scale.

use super::DynamicQuantLinear;
use crate::error::Result;
use crate::gemm::GemmDispatcher;
use crate::quant::{per_tensor_quantize, QuantizedTensor};
use crate::tensor::Tensor;
use std::sync::Arc;

/// Behaves like [`DynamicQuantLinear`] while tracking the running maximum of
/// the per-call activation scales.
#[derive(Debug, Clone)]
pub struct CalibratingObserver {
    weight: Arc<QuantizedTensor>,
    bias: Option<Tensor>,
    observed_scale: Option<f32>,
    num_observations: usize,
}

impl CalibratingObserver {
    /// Take over the quantized weight of a dynamic layer.
    pub fn from_dynamic(layer: &DynamicQuantLinear) -> Self {
        Self {
            weight: Arc::clone(layer.weight()),
            bias: layer.bias().cloned(),
            observed_scale: None,
            num_observations: 0,
        }
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

    /// Largest activation scale seen so far; `None` before the first call.
    pub fn observed_scale(&self) -> Option<f32> {
        self.observed_scale
    }

    /// Get the number of forward calls observed.
    pub fn num_observations(&self) -> usize {
        self.num_observations
    }

    /// Fold one activation scale into the running maximum.
    pub fn observe(&mut self, scale: f32) {
        self.observed_scale = Some(self.observed_scale.map_or(scale, |s| s.max(scale)));
        self.num_observations += 1;
    }

    /// Record the scale of `x`, then compute like the dynamic layer.
    pub fn forward(&mut self, x: &Tensor, gemm: &GemmDispatcher) -> Result<Tensor> {
        let (qx, x_scale) = per_tensor_quantize(x);
        self.observe(x_scale);
        gemm.gemm(&qx, &self.weight, self.bias.as_ref(), x.dtype())
    }
}
