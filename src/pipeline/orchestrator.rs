//! Quantization pipeline orchestrator
//!
//! Drives a [`CausalLm`] through weight quantization, calibration and
//! activation freezing, enforcing phase order and collecting metrics.

use super::config::PipelineConfig;
use super::metrics::QuantizationMetrics;
use super::phases;
use super::stage::QuantizationStage;
use crate::calibration::CalibrationSet;
use crate::error::{Error, Result};
use crate::gemm::GemmDispatcher;
use crate::model::CausalLm;
use crate::tensor::{ops, Tensor};
use std::time::Instant;

/// Quantization pipeline orchestrator.
#[derive(Debug, Clone)]
pub struct QuantizationPipeline {
    /// Configuration.
    config: PipelineConfig,
    /// GEMM dispatcher shared by every forward pass.
    gemm: GemmDispatcher,
    /// Current stage.
    stage: QuantizationStage,
    /// Collected metrics.
    metrics: QuantizationMetrics,
    /// Token row used to measure drift.
    probe: Option<Tensor>,
    /// Hidden states of the probe before any rewrite.
    reference: Option<Tensor>,
    /// Error message if failed.
    error: Option<String>,
}

impl QuantizationPipeline {
    /// Create a new pipeline with the given configuration.
    pub fn new(config: PipelineConfig, gemm: GemmDispatcher) -> Self {
        let metrics = QuantizationMetrics::new(config.scheme());
        Self {
            config,
            gemm,
            stage: QuantizationStage::Idle,
            metrics,
            probe: None,
            reference: None,
            error: None,
        }
    }

    /// Use `tokens` as the drift probe instead of the first calibration row.
    pub fn with_probe(mut self, tokens: &[u32]) -> Result<Self> {
        self.probe = Some(Tensor::from_tokens(tokens, 1, tokens.len())?);
        Ok(self)
    }

    /// Get the current stage.
    pub fn stage(&self) -> QuantizationStage {
        self.stage
    }

    /// Get the configuration.
    pub fn config(&self) -> &PipelineConfig {
        &self.config
    }

    /// Get the GEMM dispatcher.
    pub fn gemm(&self) -> &GemmDispatcher {
        &self.gemm
    }

    /// Get the collected metrics.
    pub fn metrics(&self) -> &QuantizationMetrics {
        &self.metrics
    }

    /// Get the error message if failed.
    pub fn error(&self) -> Option<&str> {
        self.error.as_deref()
    }

    /// Phase 1: quantize every linear weight to FP8.
    ///
    /// Returns the number of layers rewritten.
    pub fn quantize_weights(&mut self, model: &mut CausalLm) -> Result<usize> {
        self.expect_stage("quantize weights", QuantizationStage::Idle)?;
        let start = Instant::now();
        let result = self.quantize_weights_inner(model);
        let rewritten = self.guard(result)?;
        self.finish_phase(QuantizationStage::WeightsQuantized, start, rewritten);
        Ok(rewritten)
    }

    fn quantize_weights_inner(&mut self, model: &mut CausalLm) -> Result<usize> {
        if self.config.measure_drift() && self.reference.is_none() {
            if let Some(probe) = &self.probe {
                self.reference = Some(model.hidden_states(probe, &self.gemm)?);
            }
        }
        let original = phases::affine_weight_bytes(model.decoder());
        let paths = phases::quantize_weights(model.decoder_mut())?;
        let quantized = phases::affine_weight_bytes(model.decoder());

        self.metrics.layers_quantized = paths.len();
        self.metrics.update_weight_bytes(original, quantized);
        self.metrics.layer_scales = phases::layer_scales(model.decoder());
        self.record_drift(model, QuantizationStage::WeightsQuantized)?;
        Ok(paths.len())
    }

    /// Phase 2: insert observers and run the calibration set through them.
    ///
    /// Returns the number of calibration passes.
    pub fn calibrate(&mut self, model: &mut CausalLm, set: &CalibrationSet) -> Result<usize> {
        self.expect_stage("calibrate", QuantizationStage::WeightsQuantized)?;
        let start = Instant::now();
        let result = self.calibrate_inner(model, set);
        let passes = self.guard(result)?;
        self.finish_phase(QuantizationStage::Calibrated, start, passes);
        Ok(passes)
    }

    fn calibrate_inner(&mut self, model: &mut CausalLm, set: &CalibrationSet) -> Result<usize> {
        if set.is_empty() {
            return Err(Error::EmptyCalibrationSet);
        }
        let paths = phases::insert_observers(model.decoder_mut())?;
        self.metrics.observers_inserted = paths.len();
        let passes = phases::run_calibration(model.decoder_mut(), set, &self.gemm)?;
        self.metrics.calibration_passes = passes;
        self.metrics.calibration_padded_tokens = set.padded_tokens();
        Ok(passes)
    }

    /// Phase 3: freeze observed activation scales into static layers.
    ///
    /// Returns the number of layers frozen.
    pub fn freeze(&mut self, model: &mut CausalLm) -> Result<usize> {
        self.expect_stage("freeze", QuantizationStage::Calibrated)?;
        let start = Instant::now();
        let result = self.freeze_inner(model);
        let frozen = self.guard(result)?;
        self.finish_phase(QuantizationStage::Frozen, start, frozen);
        Ok(frozen)
    }

    fn freeze_inner(&mut self, model: &mut CausalLm) -> Result<usize> {
        let paths = phases::freeze_activations(model.decoder_mut())?;
        self.metrics.layers_frozen = paths.len();
        self.metrics.layer_scales = phases::layer_scales(model.decoder());
        self.record_drift(model, QuantizationStage::Frozen)?;
        Ok(paths.len())
    }

    /// Run every phase the configured scheme calls for.
    ///
    /// The static scheme requires a calibration set; the dynamic scheme stops
    /// after Phase 1 and ignores it. Without an explicit probe, the first
    /// calibration row is used to measure drift.
    pub fn run(
        &mut self,
        model: &mut CausalLm,
        calibration: Option<&CalibrationSet>,
    ) -> Result<&QuantizationMetrics> {
        if self.probe.is_none() && self.config.measure_drift() {
            if let Some(set) = calibration.filter(|s| !s.is_empty()) {
                self.probe = Some(set.row_tensor(0)?);
            }
        }

        self.quantize_weights(model)?;
        if self.config.scheme().needs_calibration() {
            let Some(set) = calibration else {
                self.fail(Error::EmptyCalibrationSet.to_string());
                return Err(Error::EmptyCalibrationSet);
            };
            self.calibrate(model, set)?;
            self.freeze(model)?;
        }

        tracing::info!(
            scheme = %self.config.scheme(),
            layers = self.metrics.layers_quantized,
            compression = self.metrics.compression_ratio(),
            drift = ?self.metrics.final_probe_drift(),
            seconds = self.metrics.total_duration_secs(),
            "quantization complete"
        );
        Ok(&self.metrics)
    }

    /// Mark the pipeline as failed with an error message.
    pub fn fail(&mut self, error: impl Into<String>) {
        self.error = Some(error.into());
        self.stage = QuantizationStage::Failed;
    }

    /// Reset the pipeline to idle state.
    ///
    /// The model itself is not restored.
    pub fn reset(&mut self) {
        self.stage = QuantizationStage::Idle;
        self.metrics = QuantizationMetrics::new(self.config.scheme());
        self.reference = None;
        self.error = None;
    }

    /// Check if the pipeline has nothing left to run (success or failure).
    pub fn is_complete(&self) -> bool {
        self.stage.is_terminal()
            || (!self.config.scheme().needs_calibration()
                && self.stage == QuantizationStage::WeightsQuantized)
    }

    /// Check if the pipeline succeeded.
    pub fn succeeded(&self) -> bool {
        self.is_complete() && !self.failed()
    }

    /// Check if the pipeline failed.
    pub fn failed(&self) -> bool {
        self.stage == QuantizationStage::Failed
    }

    /// Get overall pipeline progress (0.0 to 1.0).
    pub fn overall_progress(&self) -> f32 {
        if self.succeeded() {
            return 1.0;
        }
        match self.stage {
            QuantizationStage::Idle | QuantizationStage::Failed => 0.0,
            QuantizationStage::WeightsQuantized => 0.2,
            QuantizationStage::Calibrated => 0.9,
            QuantizationStage::Frozen => 1.0,
        }
    }

    fn expect_stage(&self, phase: &'static str, expected: QuantizationStage) -> Result<()> {
        if self.stage == expected {
            return Ok(());
        }
        Err(Error::PhaseOrder {
            phase,
            expected: expected.display_name(),
            actual: self.stage.display_name(),
        })
    }

    fn guard<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            tracing::error!(stage = self.stage.display_name(), error = %e, "quantization phase failed");
            self.fail(e.to_string());
        }
        result
    }

    fn finish_phase(&mut self, stage: QuantizationStage, start: Instant, count: usize) {
        let secs = start.elapsed().as_secs_f64();
        self.metrics.record_stage_duration(stage, secs);
        self.stage = stage;
        tracing::info!(stage = stage.display_name(), count, seconds = secs, "phase finished");
    }

    fn record_drift(&mut self, model: &mut CausalLm, stage: QuantizationStage) -> Result<()> {
        let (Some(probe), Some(reference)) = (&self.probe, &self.reference) else {
            return Ok(());
        };
        let hidden = model.hidden_states(probe, &self.gemm)?;
        let drift = ops::relative_error(&hidden, reference)?;
        tracing::info!(stage = stage.display_name(), drift, "probe drift");
        self.metrics.record_probe_drift(stage, drift);
        Ok(())
    }
}
