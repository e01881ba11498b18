//! FP8 quantization primitives
//!
//! - [`fp8`]: bit-exact E4M3FN encode/decode (round-to-nearest-even, saturating)
//! - [`per_tensor_quantize`]: dynamic per-tensor quantization, one scale per tensor
//! - [`quantize_with_scale`]: static quantization with a calibrated scale
//! - [`linear`]: the dynamic, calibrating and static FP8 linear layers

pub mod fp8;
pub mod linear;
mod per_tensor;
#[cfg(test)]
mod tests;

pub use fp8::{e4m3_to_f32, f32_to_e4m3, E4M3_MAX, E4M3_MIN};
pub use linear::{CalibratingObserver, DynamicQuantLinear, StaticQuantLinear};
pub use per_tensor::{per_tensor_quantize, quantize_with_scale, QuantizedTensor, MIN_AMAX};
