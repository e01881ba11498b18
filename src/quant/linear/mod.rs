//! FP8 linear layer variants
//!
//! A layer moves one way through these states during quantization:
//! `Linear` → [`DynamicQuantLinear`] → [`CalibratingObserver`] → [`StaticQuantLinear`].
//! The quantized weight is shared between states and never re-quantized.

mod dynamic;
mod observer;
mod static_linear;
#[cfg(test)]
mod tests;

pub use dynamic::DynamicQuantLinear;
pub use observer::CalibratingObserver;
pub use static_linear::StaticQuantLinear;
