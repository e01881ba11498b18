//! FP8 linear layer with a frozen activation scale.

use super::CalibratingObserver;
use crate::error::{Error, Result};
use crate::gemm::GemmDispatcher;
use crate::quant::{quantize_with_scale, QuantizedTensor};
use crate::tensor::Tensor;
use std::sync::Arc;

/// Fully static FP8 linear layer: both the weight scale and the activation
/// scale are fixed.
#[derive(Debug, Clone)]
pub struct StaticQuantLinear {
    weight: Arc<QuantizedTensor>,
    bias: Option<Tensor>,
    act_scale: f32,
}

impl StaticQuantLinear {
    /// Freeze an observer's running scale.
    ///
    /// Fails with [`Error::UncalibratedScale`] if the observer never ran.
    pub fn try_from_observer(layer: &str, observer: &CalibratingObserver) -> Result<Self> {
        let act_scale = observer
            .observed_scale()
            .ok_or_else(|| Error::UncalibratedScale {
                layer: layer.to_string(),
            })?;
        Self::new(Arc::clone(observer.weight()), observer.bias().cloned(), act_scale)
    }

    /// Build from parts; `act_scale` must be finite and positive.
    pub fn new(weight: Arc<QuantizedTensor>, bias: Option<Tensor>, act_scale: f32) -> Result<Self> {
        if !act_scale.is_finite() || act_scale <= 0.0 {
            return Err(Error::InvalidScale { scale: act_scale });
        }
        Ok(Self {
            weight,
            bias,
            act_scale,
        })
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

    /// Get the frozen activation scale.
    pub fn act_scale(&self) -> f32 {
        self.act_scale
    }

    /// Quantize `x` with the frozen scale and run the FP8 GEMM.
    pub fn forward(&self, x: &Tensor, gemm: &GemmDispatcher) -> Result<Tensor> {
        let qx = quantize_with_scale(x, self.act_scale)?;
        gemm.gemm(&qx, &self.weight, self.bias.as_ref(), x.dtype())
    }
}
