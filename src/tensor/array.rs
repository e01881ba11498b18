//! Dense n-dimensional tensor with a storage dtype.

use super::DType;
use crate::error::{Error, Result};
use ndarray::{ArrayD, IxDyn};

/// Dense tensor: `f32` values rounded to the precision of `dtype`.
#[derive(Debug, Clone, PartialEq)]
pub struct Tensor {
    data: ArrayD<f32>,
    dtype: DType,
}

impl Tensor {
    /// Wrap an array, rounding every element to `dtype`.
    pub fn new(mut data: ArrayD<f32>, dtype: DType) -> Self {
        if dtype != DType::F32 {
            data.mapv_inplace(|v| dtype.round(v));
        }
        Self { data, dtype }
    }

    /// Build a tensor from flat row-major values.
    pub fn from_vec(values: Vec<f32>, shape: &[usize], dtype: DType) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if values.len() != expected {
            return Err(Error::shape_mismatch("from_vec", &[expected], &[values.len()]));
        }
        let data = ArrayD::from_shape_vec(IxDyn(shape), values)
            .map_err(|e| Error::InvalidGraph(format!("from_vec: {e}")))?;
        Ok(Self::new(data, dtype))
    }

    /// Tensor of token ids, shape `[rows, cols]`.
    pub fn from_tokens(tokens: &[u32], rows: usize, cols: usize) -> Result<Self> {
        let values = tokens.iter().map(|&t| t as f32).collect();
        Self::from_vec(values, &[rows, cols], DType::I64)
    }

    /// Create a zero tensor.
    pub fn zeros(shape: &[usize], dtype: DType) -> Self {
        Self {
            data: ArrayD::zeros(IxDyn(shape)),
            dtype,
        }
    }

    /// Tensor with every element set to `value`.
    pub fn full(shape: &[usize], value: f32, dtype: DType) -> Self {
        Self::new(ArrayD::from_elem(IxDyn(shape), value), dtype)
    }

    /// Get the shape.
    pub fn shape(&self) -> &[usize] {
        self.data.shape()
    }

    /// Get the dtype.
    pub fn dtype(&self) -> DType {
        self.dtype
    }

    /// Get the number of elements.
    pub fn numel(&self) -> usize {
        self.data.len()
    }

    /// Get the number of dimensions.
    pub fn ndim(&self) -> usize {
        self.data.ndim()
    }

    /// Get the underlying array.
    pub fn data(&self) -> &ArrayD<f32> {
        &self.data
    }

    /// Row-major copy of the values.
    pub fn to_vec(&self) -> Vec<f32> {
        self.data.iter().copied().collect()
    }

    /// Bytes occupied by this tensor at its dtype.
    pub fn storage_bytes(&self) -> u64 {
        self.dtype.storage_bytes(self.numel())
    }

    /// Cast to another dtype (values re-rounded).
    pub fn to_dtype(&self, dtype: DType) -> Self {
        if dtype == self.dtype {
            return self.clone();
        }
        Self::new(self.data.clone(), dtype)
    }

    /// Elementwise map; the result keeps this tensor's dtype.
    pub fn map(&self, f: impl Fn(f32) -> f32) -> Self {
        Self::new(self.data.mapv(f), self.dtype)
    }

    /// Minimum and maximum over all elements in a single pass.
    ///
    /// NaN elements are skipped; an empty (or all-NaN) tensor yields `(0.0, 0.0)`.
    pub fn aminmax(&self) -> (f32, f32) {
        let (min, max) = self
            .data
            .iter()
            .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| (lo.min(v), hi.max(v)));
        if min > max {
            (0.0, 0.0)
        } else {
            (min, max)
        }
    }

    /// Largest absolute value, `max(|min|, |max|)`.
    pub fn amax(&self) -> f32 {
        let (min, max) = self.aminmax();
        min.abs().max(max.abs())
    }

    /// Reshape (row-major) to a new shape with the same element count.
    pub fn reshape(&self, shape: &[usize]) -> Result<Self> {
        let expected: usize = shape.iter().product();
        if expected != self.numel() {
            return Err(Error::shape_mismatch("reshape", shape, self.shape()));
        }
        let data = ArrayD::from_shape_vec(IxDyn(shape), self.to_vec())
            .map_err(|e| Error::InvalidGraph(format!("reshape: {e}")))?;
        Ok(Self {
            data,
            dtype: self.dtype,
        })
    }
}
