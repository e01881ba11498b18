//! Error types for the quantization pipeline.
//!
//! Every failure carries enough context (the layer path, the offending value,
//! the shapes involved) to act on it without re-running under a debugger.

use thiserror::Error;

/// Result type alias for cuantizar operations.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while loading, quantizing, calibrating or exporting.
#[derive(Debug, Error)]
pub enum Error {
    /// Unknown dtype string or a tensor dtype the operation cannot handle.
    #[error("Invalid dtype: {value}\n  → Supported: bool, float8_e4m3fn, float16, bfloat16, float32, int32, int64")]
    InvalidDtype { value: String },

    /// Static quantization scale must be finite and strictly positive.
    #[error("Invalid quantization scale {scale}: must be finite and > 0")]
    InvalidScale { scale: f32 },

    /// A dotted module path does not resolve to a parent container and slot.
    #[error("Module path does not resolve: '{path}'")]
    UnresolvedPath { path: String },

    /// An observer reached the freeze phase without observing any activation.
    #[error("Layer '{layer}' has no calibrated activation scale\n  → Run calibration with at least one sample before freezing")]
    UncalibratedScale { layer: String },

    /// Operand shapes are incompatible.
    #[error("Shape mismatch in {context}: expected {expected:?}, got {actual:?}")]
    ShapeMismatch {
        context: String,
        expected: Vec<usize>,
        actual: Vec<usize>,
    },

    /// Token id outside of the embedding table.
    #[error("Token id {token} out of range for vocabulary of size {vocab_size}")]
    TokenOutOfRange { token: i64, vocab_size: usize },

    /// A container is missing a child its forward pass requires.
    #[error("Invalid module graph: {0}")]
    InvalidGraph(String),

    /// A pipeline phase was invoked from the wrong stage.
    #[error("Cannot {phase} in stage {actual}, expected {expected}")]
    PhaseOrder {
        phase: &'static str,
        expected: &'static str,
        actual: &'static str,
    },

    /// Calibration requires at least one sample.
    #[error("Calibration set is empty\n  → Provide --num-samples > 0 or a non-empty --calibration-data file")]
    EmptyCalibrationSet,

    /// Model loader could not find a required parameter.
    #[error("Missing tensor '{name}' in model weights")]
    MissingTensor { name: String },

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// IO error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Serialization/deserialization error.
    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl Error {
    /// Shape mismatch helper.
    pub fn shape_mismatch(context: impl Into<String>, expected: &[usize], actual: &[usize]) -> Self {
        Self::ShapeMismatch {
            context: context.into(),
            expected: expected.to_vec(),
            actual: actual.to_vec(),
        }
    }

    /// Check if this error was caused by user input rather than a defect.
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidDtype { .. }
                | Self::UncalibratedScale { .. }
                | Self::TokenOutOfRange { .. }
                | Self::EmptyCalibrationSet
                | Self::MissingTensor { .. }
                | Self::ConfigError(_)
        )
    }

    /// Get the error code for structured output.
    pub fn code(&self) -> &'static str {
        match self {
            Self::InvalidDtype { .. } => "Q001",
            Self::InvalidScale { .. } => "Q002",
            Self::UnresolvedPath { .. } => "Q010",
            Self::InvalidGraph(_) => "Q011",
            Self::UncalibratedScale { .. } => "Q020",
            Self::EmptyCalibrationSet => "Q021",
            Self::PhaseOrder { .. } => "Q022",
            Self::ShapeMismatch { .. } => "Q030",
            Self::TokenOutOfRange { .. } => "Q031",
            Self::MissingTensor { .. } => "Q040",
            Self::ConfigError(_) => "Q041",
            Self::Io(_) => "Q050",
            Self::Serialization(_) => "Q051",
        }
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

impl From<safetensors::SafeTensorError> for Error {
    fn from(e: safetensors::SafeTensorError) -> Self {
        Self::Serialization(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    fn all_errors() -> Vec<Error> {
        vec![
            Error::InvalidDtype { value: "x".into() },
            Error::InvalidScale { scale: 0.0 },
            Error::UnresolvedPath { path: "a.b".into() },
            Error::InvalidGraph("x".into()),
            Error::UncalibratedScale { layer: "a".into() },
            Error::EmptyCalibrationSet,
            Error::PhaseOrder { phase: "freeze", expected: "Calibrated", actual: "Idle" },
            Error::shape_mismatch("gemm", &[2, 3], &[3, 2]),
            Error::TokenOutOfRange { token: 9, vocab_size: 4 },
            Error::MissingTensor { name: "w".into() },
            Error::ConfigError("x".into()),
            Error::Io(std::io::Error::other("x")),
            Error::Serialization("x".into()),
        ]
    }

    #[test]
    fn test_error_codes_are_unique() {
        let codes: HashSet<&str> = all_errors().iter().map(Error::code).collect();
        assert_eq!(codes.len(), all_errors().len());
    }

    #[test]
    fn test_user_errors() {
        assert!(Error::UncalibratedScale { layer: "a".into() }.is_user_error());
        assert!(Error::EmptyCalibrationSet.is_user_error());
        assert!(!Error::UnresolvedPath { path: "a".into() }.is_user_error());
        assert!(!Error::InvalidScale { scale: -1.0 }.is_user_error());
    }

    #[test]
    fn test_display_includes_context() {
        let msg = Error::UncalibratedScale { layer: "layers.0.mlp.up_proj".into() }.to_string();
        assert!(msg.contains("layers.0.mlp.up_proj"));

        let msg = Error::shape_mismatch("gemm", &[2, 3], &[4, 3]).to_string();
        assert!(msg.contains("[2, 3]"));
        assert!(msg.contains("[4, 3]"));
    }

    #[test]
    fn test_io_conversion() {
        let err: Error = std::io::Error::new(std::io::ErrorKind::NotFound, "gone").into();
        assert_eq!(err.code(), "Q050");
    }
}
