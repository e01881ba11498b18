//! Quantize-Calibrate-Freeze pipeline
//!
//! Rewrites every affine layer of a decoder graph in three phases:
//! 1. Quantize weights: `Linear` → `DynamicQuantLinear`
//! 2. Calibrate: `DynamicQuantLinear` → `CalibratingObserver`, then run the
//!    calibration set
//! 3. Freeze: `CalibratingObserver` → `StaticQuantLinear`
//!
//! The dynamic activation scheme stops after Phase 1.

mod config;
pub mod export;
mod metrics;
mod orchestrator;
pub mod phases;
mod stage;
#[cfg(test)]
mod tests;

pub use config::{ActivationScheme, PipelineConfig};
pub use export::{export_quantized_model, ExportResult, MetricsReport};
pub use metrics::{LayerScale, QuantizationMetrics};
pub use orchestrator::QuantizationPipeline;
pub use stage::QuantizationStage;
