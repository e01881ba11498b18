//! Pipeline configuration

use serde::{Deserialize, Serialize};

/// How activations are quantized in the final model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ActivationScheme {
    /// Activation scales calibrated once and frozen.
    #[default]
    Static,
    /// Activation scales recomputed on every forward pass; no calibration.
    Dynamic,
}

impl ActivationScheme {
    /// Whether the calibration and freeze phases run.
    pub fn needs_calibration(&self) -> bool {
        matches!(self, ActivationScheme::Static)
    }
}

impl std::str::FromStr for ActivationScheme {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "static" => Ok(ActivationScheme::Static),
            "dynamic" => Ok(ActivationScheme::Dynamic),
            _ => Err(format!(
                "Unknown activation scheme: {s}. Valid schemes: static, dynamic"
            )),
        }
    }
}

impl std::fmt::Display for ActivationScheme {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ActivationScheme::Static => write!(f, "static"),
            ActivationScheme::Dynamic => write!(f, "dynamic"),
        }
    }
}

/// Quantization pipeline configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    scheme: ActivationScheme,
    measure_drift: bool,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            scheme: ActivationScheme::Static,
            measure_drift: true,
        }
    }
}

impl PipelineConfig {
    /// Create a config with default settings.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the activation scheme.
    pub fn with_scheme(mut self, scheme: ActivationScheme) -> Self {
        self.scheme = scheme;
        self
    }

    /// Compare final hidden states on a probe row against the unquantized
    /// model after each rewriting phase.
    pub fn with_measure_drift(mut self, enabled: bool) -> Self {
        self.measure_drift = enabled;
        self
    }

    /// Get the activation scheme.
    pub fn scheme(&self) -> ActivationScheme {
        self.scheme
    }

    /// Check if drift measurement is enabled.
    pub fn measure_drift(&self) -> bool {
        self.measure_drift
    }
}
