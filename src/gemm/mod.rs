//! Mixed-precision GEMM
//!
//! FP8 operands are multiplied either by a native scaled-matmul primitive
//! (compute capability 9.0 and above) or by dequantizing both operands to the
//! output dtype and running a dense matmul. Both paths return the same result
//! up to rounding.

mod device;
mod dispatch;

pub use device::{
    CapabilityQuery, ComputeCapability, DeviceInfo, CAPABILITY_ENV, FP8_NATIVE_CAPABILITY,
};
pub use dispatch::{fallback_gemm, EmulatedScaledMatmul, GemmDispatcher, GemmPath, ScaledMatmul};
