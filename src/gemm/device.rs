//! Compute device information and capability detection.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Environment variable that overrides the detected compute capability, e.g. `9.0`.
pub const CAPABILITY_ENV: &str = "CUANTIZAR_COMPUTE_CAPABILITY";

/// CUDA-style compute capability `(major, minor)`, ordered lexicographically.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct ComputeCapability {
    pub major: u32,
    pub minor: u32,
}

/// Minimum capability with native FP8 matrix multiplication.
pub const FP8_NATIVE_CAPABILITY: ComputeCapability = ComputeCapability::new(9, 0);

impl ComputeCapability {
    /// Create a compute capability `major.minor`.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }
}

impl fmt::Display for ComputeCapability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.major, self.minor)
    }
}

impl FromStr for ComputeCapability {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let invalid = || Error::ConfigError(format!("Invalid compute capability '{s}', expected MAJOR.MINOR (e.g. 9.0)"));
        let (major, minor) = s.trim().split_once('.').ok_or_else(invalid)?;
        Ok(Self {
            major: major.parse().map_err(|_| invalid())?,
            minor: minor.parse().map_err(|_| invalid())?,
        })
    }
}

/// Source of the compute capability used for GEMM dispatch.
pub trait CapabilityQuery {
    /// Capability of the active device, `None` if it has no accelerator.
    fn compute_capability(&self) -> Option<ComputeCapability>;

    /// Check if the device reaches `required`.
    fn supports(&self, required: ComputeCapability) -> bool {
        self.compute_capability().is_some_and(|c| c >= required)
    }
}

/// Device the quantized model runs on.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device name/model
    pub name: String,
    /// Compute capability if this is an accelerator
    pub compute_capability: Option<ComputeCapability>,
}

impl DeviceInfo {
    /// CPU device, no compute capability.
    pub fn cpu() -> Self {
        Self {
            name: "cpu".to_string(),
            compute_capability: None,
        }
    }

    /// Accelerator device without a known capability.
    pub fn accelerator(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            compute_capability: None,
        }
    }

    /// Set compute capability
    pub fn with_compute_capability(mut self, major: u32, minor: u32) -> Self {
        self.compute_capability = Some(ComputeCapability::new(major, minor));
        self
    }

    /// Detect the active device.
    ///
    /// No accelerator runtime is linked, so this reports the CPU unless
    /// `CUANTIZAR_COMPUTE_CAPABILITY` names a capability to simulate.
    pub fn detect() -> Self {
        match std::env::var(CAPABILITY_ENV) {
            Ok(value) => Self::from_capability_str(&value).unwrap_or_else(|e| {
                tracing::warn!(%value, error = %e, "ignoring {CAPABILITY_ENV}");
                Self::cpu()
            }),
            Err(_) => Self::cpu(),
        }
    }

    /// Simulated accelerator with the capability parsed from `value`.
    pub fn from_capability_str(value: &str) -> Result<Self> {
        let cap: ComputeCapability = value.parse()?;
        Ok(Self::accelerator(format!("simulated-sm{}{}", cap.major, cap.minor))
            .with_compute_capability(cap.major, cap.minor))
    }
}

impl Default for DeviceInfo {
    fn default() -> Self {
        Self::cpu()
    }
}

impl CapabilityQuery for DeviceInfo {
    fn compute_capability(&self) -> Option<ComputeCapability> {
        self.compute_capability
    }
}
