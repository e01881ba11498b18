//! Quantization pipeline stage enum

use serde::{Deserialize, Serialize};

/// Current stage of the quantization pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub enum QuantizationStage {
    /// Nothing rewritten yet.
    #[default]
    Idle,
    /// Every linear layer holds FP8 weights and quantizes activations per call.
    WeightsQuantized,
    /// Observers are in place and have seen the calibration set.
    Calibrated,
    /// Activation scales are frozen into static layers.
    Frozen,
    /// A phase failed; the graph may be partially rewritten.
    Failed,
}

impl QuantizationStage {
    /// Check if the pipeline has started and not yet finished.
    pub fn is_active(&self) -> bool {
        matches!(
            self,
            QuantizationStage::WeightsQuantized | QuantizationStage::Calibrated
        )
    }

    /// Check if no further phase can run (success or failure).
    pub fn is_terminal(&self) -> bool {
        matches!(self, QuantizationStage::Frozen | QuantizationStage::Failed)
    }

    /// Get display name for the stage.
    pub fn display_name(&self) -> &'static str {
        match self {
            QuantizationStage::Idle => "Idle",
            QuantizationStage::WeightsQuantized => "Weights Quantized",
            QuantizationStage::Calibrated => "Calibrated",
            QuantizationStage::Frozen => "Frozen",
            QuantizationStage::Failed => "Failed",
        }
    }
}
