//! Scaled FP8 matrix multiplication with capability-gated dispatch.

use super::device::{CapabilityQuery, DeviceInfo, FP8_NATIVE_CAPABILITY};
use crate::error::{Error, Result};
use crate::quant::QuantizedTensor;
use crate::tensor::ops::{as_rows, finish_rows, matmul_rows, weight_view};
use crate::tensor::{DType, Tensor};
use ndarray::Array2;
use std::fmt;
use std::sync::Arc;

/// Native scaled matmul primitive operating directly on FP8 operands.
///
/// Computes `(a · bᵀ) · a.scale · b.scale + bias` for `a: [.., k]` and
/// `b: [n, k]`, producing `[.., n]` at `out_dtype`.
pub trait ScaledMatmul: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    fn scaled_mm(
        &self,
        a: &QuantizedTensor,
        b: &QuantizedTensor,
        bias: Option<&Tensor>,
        out_dtype: DType,
    ) -> Result<Tensor>;
}

/// Reference implementation of [`ScaledMatmul`].
///
/// Multiplies the raw FP8 grid values with `f32` accumulation and applies the
/// combined scale once per output element, the way tensor-core kernels do.
#[derive(Debug, Clone, Copy, Default)]
pub struct EmulatedScaledMatmul;

impl ScaledMatmul for EmulatedScaledMatmul {
    fn name(&self) -> &'static str {
        "emulated-scaled-mm"
    }

    fn scaled_mm(
        &self,
        a: &QuantizedTensor,
        b: &QuantizedTensor,
        bias: Option<&Tensor>,
        out_dtype: DType,
    ) -> Result<Tensor> {
        let a_fp8 = a.as_fp8()?;
        let b_fp8 = b.as_fp8()?;
        let (rows, lead) = as_rows(&a_fp8)?;
        let w = weight_view(&b_fp8)?;
        let k = w.ncols();
        if rows.ncols() != k {
            return Err(Error::shape_mismatch("scaled_mm inner dimension", &[k], &[rows.ncols()]));
        }

        let mut acc: Array2<f32> = rows.dot(&w.t());
        acc *= a.scale * b.scale;
        finish_rows(acc, bias, lead, out_dtype)
    }
}

/// Path taken by [`GemmDispatcher::gemm`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GemmPath {
    /// Native primitive on FP8 operands.
    Native,
    /// Dequantize both operands and multiply in full precision.
    Fallback,
}

impl GemmPath {
    /// Get the display name.
    pub fn display_name(&self) -> &'static str {
        match self {
            GemmPath::Native => "native scaled-mm",
            GemmPath::Fallback => "dequantize fallback",
        }
    }
}

/// Dispatches FP8 GEMMs to the native primitive or the dequantize fallback.
///
/// The native path requires compute capability ≥ 9.0 and a registered
/// [`ScaledMatmul`]; anything else falls back. The decision is made once.
#[derive(Debug, Clone)]
pub struct GemmDispatcher {
    device: DeviceInfo,
    native: Option<Arc<dyn ScaledMatmul>>,
    path: GemmPath,
}

impl GemmDispatcher {
    /// Create a dispatcher for `device` with an optional native primitive.
    pub fn new(device: DeviceInfo, native: Option<Arc<dyn ScaledMatmul>>) -> Self {
        let path = match &native {
            Some(_) if device.supports(FP8_NATIVE_CAPABILITY) => GemmPath::Native,
            _ => GemmPath::Fallback,
        };
        match path {
            GemmPath::Native => tracing::info!(
                device = %device.name,
                capability = ?device.compute_capability,
                "FP8 GEMM using native scaled-mm"
            ),
            GemmPath::Fallback => tracing::debug!(
                device = %device.name,
                capability = ?device.compute_capability,
                "FP8 GEMM falling back to dequantize + dense matmul"
            ),
        }
        Self { device, native, path }
    }

    /// Fallback-only dispatcher for the CPU.
    pub fn cpu() -> Self {
        Self::new(DeviceInfo::cpu(), None)
    }

    /// Dispatcher for `device`, using [`EmulatedScaledMatmul`] as the native
    /// primitive whenever the capability allows it.
    pub fn with_emulated_native(device: DeviceInfo) -> Self {
        Self::new(device, Some(Arc::new(EmulatedScaledMatmul)))
    }

    /// Get the device the path was selected for.
    pub fn device(&self) -> &DeviceInfo {
        &self.device
    }

    /// Get the selected GEMM path.
    pub fn path(&self) -> GemmPath {
        self.path
    }

    /// `a · bᵀ` with both scales applied, plus `bias`, at `out_dtype`.
    ///
    /// `a` is an activation of shape `[.., k]`, `b` a weight of shape `[n, k]`.
    pub fn gemm(
        &self,
        a: &QuantizedTensor,
        b: &QuantizedTensor,
        bias: Option<&Tensor>,
        out_dtype: DType,
    ) -> Result<Tensor> {
        check_operands(a, b)?;
        match (&self.native, self.path) {
            (Some(native), GemmPath::Native) => native.scaled_mm(a, b, bias, out_dtype),
            _ => fallback_gemm(a, b, bias, out_dtype),
        }
    }
}

impl Default for GemmDispatcher {
    fn default() -> Self {
        Self::cpu()
    }
}

fn check_operands(a: &QuantizedTensor, b: &QuantizedTensor) -> Result<()> {
    if b.shape.len() != 2 {
        return Err(Error::shape_mismatch("gemm weight rank", &[2], &b.shape));
    }
    let k = b.shape[1];
    match a.shape.last() {
        Some(&a_k) if a_k == k => Ok(()),
        _ => Err(Error::shape_mismatch("gemm inner dimension", &[k], &a.shape)),
    }
}

/// Dequantize both operands to `out_dtype` and run a dense matmul.
pub fn fallback_gemm(
    a: &QuantizedTensor,
    b: &QuantizedTensor,
    bias: Option<&Tensor>,
    out_dtype: DType,
) -> Result<Tensor> {
    let a_deq = a.dequantize_to(out_dtype)?;
    let b_deq = b.dequantize_to(out_dtype)?;
    let w = weight_view(&b_deq)?;
    let (rows, lead) = as_rows(&a_deq)?;
    matmul_rows(&rows, w, bias, lead, out_dtype)
}
