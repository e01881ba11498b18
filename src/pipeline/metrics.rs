//! Quantization metrics collection
//!
//! Tracks what each phase rewrote and how far the model drifted.

use super::config::ActivationScheme;
use super::stage::QuantizationStage;
use serde::{Deserialize, Serialize};

/// Scales of one quantized layer.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LayerScale {
    /// Dotted module path.
    pub name: String,
    /// Weight dequantization scale.
    pub weight_scale: f32,
    /// Frozen (or observed) activation scale; `None` for dynamic layers.
    pub act_scale: Option<f32>,
}

/// Metrics collected during quantization.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QuantizationMetrics {
    /// Activation scheme the pipeline ran with.
    pub scheme: ActivationScheme,
    /// Linear layers converted to FP8 in Phase 1.
    pub layers_quantized: usize,
    /// Observers inserted in Phase 2.
    pub observers_inserted: usize,
    /// Observers frozen into static layers in Phase 3.
    pub layers_frozen: usize,
    /// Bytes held by affine weights before Phase 1.
    pub original_weight_bytes: u64,
    /// Bytes held by affine weights after Phase 1 (codes + scale).
    pub quantized_weight_bytes: u64,
    /// Calibration forward passes run.
    pub calibration_passes: usize,
    /// Pad tokens in the calibration set.
    pub calibration_padded_tokens: usize,
    /// Per-layer scales.
    pub layer_scales: Vec<LayerScale>,
    /// Relative error of probe hidden states versus the unquantized model.
    pub probe_drift: Vec<(QuantizationStage, f32)>,
    /// Duration of each stage in seconds.
    pub stage_durations: Vec<(QuantizationStage, f64)>,
}

impl QuantizationMetrics {
    /// Create new metrics for a scheme.
    pub fn new(scheme: ActivationScheme) -> Self {
        Self {
            scheme,
            ..Default::default()
        }
    }

    /// Record weight memory before and after quantization.
    pub fn update_weight_bytes(&mut self, original: u64, quantized: u64) {
        self.original_weight_bytes = original;
        self.quantized_weight_bytes = quantized;
    }

    /// Original over quantized weight bytes; 0 before Phase 1.
    pub fn compression_ratio(&self) -> f64 {
        if self.quantized_weight_bytes == 0 {
            return 0.0;
        }
        self.original_weight_bytes as f64 / self.quantized_weight_bytes as f64
    }

    /// Record a probe drift measurement.
    pub fn record_probe_drift(&mut self, stage: QuantizationStage, drift: f32) {
        self.probe_drift.push((stage, drift));
    }

    /// Most recent probe drift.
    pub fn final_probe_drift(&self) -> Option<f32> {
        self.probe_drift.last().map(|(_, d)| *d)
    }

    /// Record stage duration.
    pub fn record_stage_duration(&mut self, stage: QuantizationStage, duration_secs: f64) {
        self.stage_durations.push((stage, duration_secs));
    }

    /// Get total pipeline duration.
    pub fn total_duration_secs(&self) -> f64 {
        self.stage_durations.iter().map(|(_, d)| d).sum()
    }

    /// Largest frozen activation scale, if any.
    pub fn max_act_scale(&self) -> Option<f32> {
        self.layer_scales
            .iter()
            .filter_map(|l| l.act_scale)
            .reduce(f32::max)
    }
}
