//! Element types and their storage widths.

use crate::error::{Error, Result};
use crate::quant::fp8;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Element type of a [`Tensor`](super::Tensor).
///
/// Values are always held as `f32` in memory; the dtype decides how they are
/// rounded on construction and how many bytes they occupy when stored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum DType {
    Bool,
    #[serde(rename = "float8_e4m3fn")]
    F8E4M3,
    #[serde(rename = "float16")]
    F16,
    #[serde(rename = "bfloat16")]
    BF16,
    #[default]
    #[serde(rename = "float32")]
    F32,
    #[serde(rename = "int32")]
    I32,
    #[serde(rename = "int64")]
    I64,
}

impl DType {
    /// Storage width in bits. `Bool` is a single bit.
    pub const fn bit_width(self) -> u32 {
        match self {
            DType::Bool => 1,
            DType::F8E4M3 => 8,
            DType::F16 | DType::BF16 => 16,
            DType::F32 | DType::I32 => 32,
            DType::I64 => 64,
        }
    }

    /// Size of one element in bytes (fractional for `Bool`).
    pub fn byte_size(self) -> f64 {
        f64::from(self.bit_width()) / 8.0
    }

    /// Bytes needed to store `numel` elements, rounded up to a whole byte.
    pub fn storage_bytes(self, numel: usize) -> u64 {
        (numel as u64 * u64::from(self.bit_width())).div_ceil(8)
    }

    /// Round an `f32` value to the nearest value representable in this dtype.
    pub fn round(self, value: f32) -> f32 {
        match self {
            DType::F32 => value,
            DType::F16 => half::f16::from_f32(value).to_f32(),
            DType::BF16 => half::bf16::from_f32(value).to_f32(),
            DType::F8E4M3 => fp8::e4m3_to_f32(fp8::f32_to_e4m3(value)),
            DType::Bool => f32::from(u8::from(value != 0.0)),
            DType::I32 | DType::I64 => value.trunc(),
        }
    }

    /// Canonical name, as written into `config.json`.
    pub fn name(self) -> &'static str {
        match self {
            DType::Bool => "bool",
            DType::F8E4M3 => "float8_e4m3fn",
            DType::F16 => "float16",
            DType::BF16 => "bfloat16",
            DType::F32 => "float32",
            DType::I32 => "int32",
            DType::I64 => "int64",
        }
    }
}

impl fmt::Display for DType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

impl FromStr for DType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let lower = s.trim().to_lowercase();
        let name = lower.strip_prefix("torch.").unwrap_or(&lower);
        match name {
            "bool" => Ok(DType::Bool),
            "float8_e4m3fn" | "float8_e4m3" | "f8_e4m3" | "fp8" | "e4m3" => Ok(DType::F8E4M3),
            "float16" | "f16" | "fp16" | "half" => Ok(DType::F16),
            "bfloat16" | "bf16" => Ok(DType::BF16),
            "float32" | "f32" | "fp32" | "float" => Ok(DType::F32),
            "int32" | "i32" | "int" => Ok(DType::I32),
            "int64" | "i64" | "long" => Ok(DType::I64),
            _ => Err(Error::InvalidDtype { value: s.to_string() }),
        }
    }
}
