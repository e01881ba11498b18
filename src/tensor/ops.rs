//! Dense kernels shared by the full-precision layers and the GEMM fallback.

use super::{DType, Tensor};
use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView1, ArrayView2, Axis, Ix1, Ix2, IxDyn};

/// Flatten `x` to `[rows, k]` where `k` is its last dimension.
pub(crate) fn as_rows(x: &Tensor) -> Result<(Array2<f32>, Vec<usize>)> {
    let shape = x.shape();
    let k = *shape
        .last()
        .ok_or_else(|| Error::shape_mismatch("matmul input", &[0], shape))?;
    let rows = if k == 0 { 0 } else { x.numel() / k };
    let flat = Array2::from_shape_vec((rows, k), x.to_vec())
        .map_err(|e| Error::InvalidGraph(format!("flatten: {e}")))?;
    Ok((flat, shape[..shape.len() - 1].to_vec()))
}

/// `y = x Wᵀ + b` with `W: [n, k]`, accumulated in `f32` and rounded to `out_dtype`.
///
/// `x` has shape `[.., k]`; the result has shape `[.., n]`.
pub fn linear(x: &Tensor, weight: &Tensor, bias: Option<&Tensor>, out_dtype: DType) -> Result<Tensor> {
    let w = weight_view(weight)?;
    let (rows, lead) = as_rows(x)?;
    matmul_rows(&rows, w, bias, lead, out_dtype)
}

pub(crate) fn weight_view(weight: &Tensor) -> Result<ArrayView2<'_, f32>> {
    weight
        .data()
        .view()
        .into_dimensionality::<Ix2>()
        .map_err(|_| Error::shape_mismatch("linear weight rank", &[2], weight.shape()))
}

/// Multiply flattened rows by `Wᵀ`, add bias, restore the leading dimensions.
pub(crate) fn matmul_rows(
    rows: &Array2<f32>,
    w: ArrayView2<'_, f32>,
    bias: Option<&Tensor>,
    lead: Vec<usize>,
    out_dtype: DType,
) -> Result<Tensor> {
    let k = w.ncols();
    if rows.ncols() != k {
        return Err(Error::shape_mismatch("matmul inner dimension", &[k], &[rows.ncols()]));
    }

    finish_rows(rows.dot(&w.t()), bias, lead, out_dtype)
}

/// Add bias to `[rows, n]` results, restore the leading dimensions and round.
pub(crate) fn finish_rows(
    mut out: Array2<f32>,
    bias: Option<&Tensor>,
    lead: Vec<usize>,
    out_dtype: DType,
) -> Result<Tensor> {
    let n = out.ncols();
    if let Some(b) = bias {
        let b = bias_view(b, n)?;
        out += &b;
    }

    let mut shape = lead;
    shape.push(n);
    let out = out
        .into_shape_with_order(IxDyn(&shape))
        .map_err(|e| Error::InvalidGraph(format!("matmul output: {e}")))?;
    Ok(Tensor::new(out, out_dtype))
}

fn bias_view(bias: &Tensor, n: usize) -> Result<ArrayView1<'_, f32>> {
    if bias.shape() != [n] {
        return Err(Error::shape_mismatch("bias", &[n], bias.shape()));
    }
    bias.data()
        .view()
        .into_dimensionality::<Ix1>()
        .map_err(|_| Error::shape_mismatch("bias rank", &[n], bias.shape()))
}

/// Root-mean-square normalization over the last dimension.
pub fn rms_norm(x: &Tensor, weight: &Tensor, eps: f32) -> Result<Tensor> {
    let (mut rows, lead) = as_rows(x)?;
    let hidden = rows.ncols();
    if weight.shape() != [hidden] {
        return Err(Error::shape_mismatch("rms_norm weight", &[hidden], weight.shape()));
    }
    let gamma = weight.data();
    for mut row in rows.axis_iter_mut(Axis(0)) {
        let mean_sq = row.iter().map(|v| v * v).sum::<f32>() / hidden.max(1) as f32;
        let inv = 1.0 / (mean_sq + eps).sqrt();
        for (v, g) in row.iter_mut().zip(gamma.iter()) {
            *v = *v * inv * g;
        }
    }
    let mut shape = lead;
    shape.push(hidden);
    let out = rows
        .into_shape_with_order(IxDyn(&shape))
        .map_err(|e| Error::InvalidGraph(format!("rms_norm: {e}")))?;
    Ok(Tensor::new(out, x.dtype()))
}

/// Elementwise sum of two tensors of identical shape.
pub fn add(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    if a.shape() != b.shape() {
        return Err(Error::shape_mismatch("add", a.shape(), b.shape()));
    }
    Ok(Tensor::new(a.data() + b.data(), a.dtype()))
}

/// Elementwise product of two tensors of identical shape.
pub fn mul(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    if a.shape() != b.shape() {
        return Err(Error::shape_mismatch("mul", a.shape(), b.shape()));
    }
    Ok(Tensor::new(a.data() * b.data(), a.dtype()))
}

pub fn silu(v: f32) -> f32 {
    v / (1.0 + (-v).exp())
}

/// tanh approximation of GELU.
pub fn gelu(v: f32) -> f32 {
    const SQRT_2_OVER_PI: f32 = 0.797_884_6;
    0.5 * v * (1.0 + (SQRT_2_OVER_PI * (v + 0.044_715 * v * v * v)).tanh())
}

/// `‖a - b‖ / ‖b‖`, or the absolute norm of the difference when `b` is zero.
pub fn relative_error(a: &Tensor, b: &Tensor) -> Result<f32> {
    if a.shape() != b.shape() {
        return Err(Error::shape_mismatch("relative_error", b.shape(), a.shape()));
    }
    let diff: f32 = a
        .data()
        .iter()
        .zip(b.data().iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt();
    let norm: f32 = b.data().iter().map(|y| y * y).sum::<f32>().sqrt();
    Ok(if norm > 0.0 { diff / norm } else { diff })
}
