//! Tensors and element types
//!
//! A [`Tensor`] holds `f32` values rounded to the precision of its [`DType`],
//! which mirrors how a half-precision checkpoint behaves numerically while
//! keeping every kernel in a single code path.

mod array;
mod dtype;
pub mod ops;

pub use array::Tensor;
pub use dtype::DType;
