//! Per-tensor FP8 quantization

use super::fp8::{self, E4M3_MAX, E4M3_MIN};
use crate::error::{Error, Result};
use crate::tensor::{DType, Tensor};
use serde::{Deserialize, Serialize};

/// Lower bound on `amax`; keeps the scale finite for all-zero tensors.
pub const MIN_AMAX: f32 = 1e-12;

/// FP8 E4M3 tensor with a single dequantization scale.
///
/// `dequantize()` reproduces the original values as `code · scale`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizedTensor {
    /// Raw E4M3FN bytes, row-major.
    pub data: Vec<u8>,
    /// Original shape.
    pub shape: Vec<usize>,
    /// Dequantization scale (reciprocal of the quantization multiplier).
    pub scale: f32,
    /// Dtype of the tensor before quantization.
    pub orig_dtype: DType,
}

impl QuantizedTensor {
    /// Get the number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Get the original shape.
    pub fn shape(&self) -> &[usize] {
        &self.shape
    }

    /// Get the dequantization scale.
    pub fn scale(&self) -> f32 {
        self.scale
    }

    /// Decoded FP8 values, without the scale applied.
    pub fn values(&self) -> Vec<f32> {
        fp8::decode_slice(&self.data)
    }

    /// The raw FP8 values as a tensor of dtype [`DType::F8E4M3`].
    pub fn as_fp8(&self) -> Result<Tensor> {
        Tensor::from_vec(self.values(), &self.shape, DType::F8E4M3)
    }

    /// Dequantize back to the original dtype.
    pub fn dequantize(&self) -> Result<Tensor> {
        self.dequantize_to(self.orig_dtype)
    }

    /// Dequantize to `dtype`: each value is cast to `dtype`, multiplied by
    /// the `f32` scale, and the product rounded to `dtype`.
    ///
    /// The scale itself is never rounded; a small activation scale would
    /// otherwise fall into the half-precision subnormal range.
    pub fn dequantize_to(&self, dtype: DType) -> Result<Tensor> {
        let values = self
            .data
            .iter()
            .map(|&b| dtype.round(fp8::e4m3_to_f32(b)) * self.scale)
            .collect();
        Tensor::from_vec(values, &self.shape, dtype)
    }

    /// Storage footprint: one byte per element plus the `f32` scale.
    pub fn memory_bytes(&self) -> u64 {
        DType::F8E4M3.storage_bytes(self.numel()) + DType::F32.storage_bytes(1)
    }
}

/// Quantize a tensor to FP8 E4M3 with a single scale derived from its range.
///
/// Returns the quantized tensor and its dequantization scale
/// `max(amax, 1e-12) / 448`.
pub fn per_tensor_quantize(tensor: &Tensor) -> (QuantizedTensor, f32) {
    let amax = tensor.amax().max(MIN_AMAX);
    let multiplier = E4M3_MAX / amax;
    let data = tensor
        .data()
        .iter()
        .map(|&v| fp8::f32_to_e4m3((v * multiplier).clamp(E4M3_MIN, E4M3_MAX)))
        .collect();
    let scale = 1.0 / multiplier;

    let quantized = QuantizedTensor {
        data,
        shape: tensor.shape().to_vec(),
        scale,
        orig_dtype: tensor.dtype(),
    };
    (quantized, scale)
}

/// Quantize with a fixed, previously calibrated dequantization scale.
///
/// Values are divided by `scale`, clamped to the E4M3 range and cast.
pub fn quantize_with_scale(tensor: &Tensor, scale: f32) -> Result<QuantizedTensor> {
    if !scale.is_finite() || scale <= 0.0 {
        return Err(Error::InvalidScale { scale });
    }
    let data = tensor
        .data()
        .iter()
        .map(|&v| fp8::f32_to_e4m3((v / scale).clamp(E4M3_MIN, E4M3_MAX)))
        .collect();

    Ok(QuantizedTensor {
        data,
        shape: tensor.shape().to_vec(),
        scale,
        orig_dtype: tensor.dtype(),
    })
}
