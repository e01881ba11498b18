//! Tests for the quantization pipeline module

use super::*;
use crate::calibration::{CalibrationDataConfig, CalibrationSet};
use crate::error::Error;
use crate::gemm::{DeviceInfo, GemmDispatcher, GemmPath};
use crate::graph::{Module, ModuleKind};
use crate::model::{CausalLm, ModelConfig};
use safetensors::{Dtype, SafeTensors};
use tempfile::TempDir;

fn tiny_model() -> CausalLm {
    CausalLm::synthetic(ModelConfig::tiny(), 7).unwrap()
}

fn calibration_set(samples: usize) -> CalibrationSet {
    let config = CalibrationDataConfig::new()
        .with_num_samples(samples)
        .with_max_seq_len(6);
    CalibrationSet::synthetic(&config, ModelConfig::tiny().vocab_size).unwrap()
}

/// q/k/v/o plus gate/up/down per decoder layer.
fn affine_count(model: &CausalLm) -> usize {
    7 * model.config().num_hidden_layers
}

// =============================================================================
// QuantizationStage Tests
// =============================================================================

#[test]
fn test_stage_is_active() {
    // TEST_ID: QP-001
    assert!(!QuantizationStage::Idle.is_active(), "QP-001 FALSIFIED: Idle should not be active");
    assert!(
        QuantizationStage::WeightsQuantized.is_active(),
        "QP-001 FALSIFIED: WeightsQuantized should be active"
    );
    assert!(QuantizationStage::Calibrated.is_active());
    assert!(!QuantizationStage::Frozen.is_active(), "QP-001 FALSIFIED: Frozen should not be active");
    assert!(!QuantizationStage::Failed.is_active());
}

#[test]
fn test_stage_is_terminal() {
    // TEST_ID: QP-002
    assert!(!QuantizationStage::Idle.is_terminal());
    assert!(!QuantizationStage::Calibrated.is_terminal());
    assert!(QuantizationStage::Frozen.is_terminal(), "QP-002 FALSIFIED: Frozen should be terminal");
    assert!(QuantizationStage::Failed.is_terminal(), "QP-002 FALSIFIED: Failed should be terminal");
}

#[test]
fn test_stage_default_and_names() {
    // TEST_ID: QP-003
    assert_eq!(QuantizationStage::default(), QuantizationStage::Idle);
    assert_eq!(QuantizationStage::WeightsQuantized.display_name(), "Weights Quantized");
    assert_eq!(QuantizationStage::Frozen.display_name(), "Frozen");
}

// =============================================================================
// Config & Metrics Tests
// =============================================================================

#[test]
fn test_scheme_parse_and_display() {
    // TEST_ID: QP-010
    assert_eq!("static".parse::<ActivationScheme>().unwrap(), ActivationScheme::Static);
    assert_eq!("Dynamic".parse::<ActivationScheme>().unwrap(), ActivationScheme::Dynamic);
    assert!("weekly".parse::<ActivationScheme>().is_err());
    assert_eq!(ActivationScheme::Dynamic.to_string(), "dynamic");
    assert_eq!(ActivationScheme::default(), ActivationScheme::Static);
    assert_eq!(serde_json::to_string(&ActivationScheme::Static).unwrap(), "\"static\"");
}

#[test]
fn test_pipeline_config_builder() {
    // TEST_ID: QP-011
    let config = PipelineConfig::new()
        .with_scheme(ActivationScheme::Dynamic)
        .with_measure_drift(false);
    assert_eq!(config.scheme(), ActivationScheme::Dynamic);
    assert!(!config.measure_drift());
    assert!(PipelineConfig::default().measure_drift());
}

#[test]
fn test_metrics_compression_ratio() {
    // TEST_ID: QP-012
    let mut metrics = QuantizationMetrics::new(ActivationScheme::Static);
    assert_eq!(metrics.compression_ratio(), 0.0);
    metrics.update_weight_bytes(4000, 1004);
    assert!((metrics.compression_ratio() - 4000.0 / 1004.0).abs() < 1e-9);
}

#[test]
fn test_metrics_durations_and_drift() {
    // TEST_ID: QP-013
    let mut metrics = QuantizationMetrics::new(ActivationScheme::Static);
    metrics.record_stage_duration(QuantizationStage::WeightsQuantized, 0.5);
    metrics.record_stage_duration(QuantizationStage::Frozen, 0.25);
    metrics.record_probe_drift(QuantizationStage::WeightsQuantized, 0.01);
    metrics.record_probe_drift(QuantizationStage::Frozen, 0.02);
    assert!((metrics.total_duration_secs() - 0.75).abs() < 1e-12);
    assert_eq!(metrics.final_probe_drift(), Some(0.02));
}

#[test]
fn test_metrics_max_act_scale() {
    // TEST_ID: QP-014
    let mut metrics = QuantizationMetrics::new(ActivationScheme::Static);
    assert_eq!(metrics.max_act_scale(), None);
    metrics.layer_scales = vec![
        LayerScale { name: "a".into(), weight_scale: 0.1, act_scale: Some(0.5) },
        LayerScale { name: "b".into(), weight_scale: 0.2, act_scale: None },
        LayerScale { name: "c".into(), weight_scale: 0.3, act_scale: Some(0.7) },
    ];
    assert_eq!(metrics.max_act_scale(), Some(0.7), "QP-014 FALSIFIED: wrong max");
}

// =============================================================================
// Phase Tests
// =============================================================================

#[test]
fn test_phase_one_is_idempotent() {
    // TEST_ID: QP-020
    let mut model = tiny_model();
    let first = phases::quantize_weights(model.decoder_mut()).unwrap();
    assert_eq!(first.len(), affine_count(&model));
    let second = phases::quantize_weights(model.decoder_mut()).unwrap();
    assert!(second.is_empty(), "QP-020 FALSIFIED: second Phase 1 rewrote {second:?}");
}

#[test]
fn test_phases_preserve_module_paths() {
    // TEST_ID: QP-021
    let mut model = tiny_model();
    let before = model.decoder().module_paths();
    let gemm = GemmDispatcher::cpu();

    phases::quantize_weights(model.decoder_mut()).unwrap();
    assert_eq!(model.decoder().module_paths(), before, "QP-021 FALSIFIED after Phase 1");

    phases::insert_observers(model.decoder_mut()).unwrap();
    phases::run_calibration(model.decoder_mut(), &calibration_set(2), &gemm).unwrap();
    assert_eq!(model.decoder().module_paths(), before, "QP-021 FALSIFIED after Phase 2");

    phases::freeze_activations(model.decoder_mut()).unwrap();
    assert_eq!(model.decoder().module_paths(), before, "QP-021 FALSIFIED after Phase 3");

    let counts = model.decoder().count_by_kind();
    assert_eq!(counts[&ModuleKind::StaticQuantLinear], affine_count(&model));
    assert!(!counts.contains_key(&ModuleKind::Linear));
}

#[test]
fn test_freeze_without_calibration_is_rejected() {
    // TEST_ID: QP-022
    let mut model = tiny_model();
    phases::quantize_weights(model.decoder_mut()).unwrap();
    phases::insert_observers(model.decoder_mut()).unwrap();

    match phases::freeze_activations(model.decoder_mut()) {
        Err(Error::UncalibratedScale { layer }) => {
            assert_eq!(layer, "layers.0.self_attn.q_proj");
        }
        other => panic!("QP-022 FALSIFIED: expected UncalibratedScale, got {other:?}"),
    }
    let counts = model.decoder().count_by_kind();
    assert_eq!(
        counts[&ModuleKind::CalibratingObserver],
        affine_count(&model),
        "QP-022 FALSIFIED: graph modified by a rejected freeze"
    );
}

#[test]
fn test_empty_calibration_set_fails() {
    // TEST_ID: QP-023
    let mut model = tiny_model();
    phases::quantize_weights(model.decoder_mut()).unwrap();
    phases::insert_observers(model.decoder_mut()).unwrap();
    let empty = CalibrationSet::from_token_rows(Vec::new(), &CalibrationDataConfig::new());
    assert!(matches!(
        phases::run_calibration(model.decoder_mut(), &empty, &GemmDispatcher::cpu()),
        Err(Error::EmptyCalibrationSet)
    ));
}

#[test]
fn test_observers_share_weight_storage() {
    // TEST_ID: QP-024
    let mut model = tiny_model();
    phases::quantize_weights(model.decoder_mut()).unwrap();
    let before = match model.decoder().get_submodule("layers.0.mlp.up_proj").unwrap() {
        Module::DynamicQuantLinear(l) => l.weight().clone(),
        other => panic!("unexpected {other:?}"),
    };
    phases::insert_observers(model.decoder_mut()).unwrap();
    match model.decoder().get_submodule("layers.0.mlp.up_proj").unwrap() {
        Module::CalibratingObserver(l) => assert!(std::sync::Arc::ptr_eq(&before, l.weight())),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_layer_scales_reported_per_layer() {
    // TEST_ID: QP-025
    let mut model = tiny_model();
    phases::quantize_weights(model.decoder_mut()).unwrap();
    let scales = phases::layer_scales(model.decoder());
    assert_eq!(scales.len(), affine_count(&model));
    assert!(scales.iter().all(|s| s.weight_scale > 0.0 && s.act_scale.is_none()));
    assert_eq!(scales[0].name, "layers.0.self_attn.q_proj");
}

// =============================================================================
// Orchestrator Tests
// =============================================================================

#[test]
fn test_full_static_run() {
    // TEST_ID: QP-030
    let mut model = tiny_model();
    let set = calibration_set(4);
    let mut pipeline = QuantizationPipeline::new(PipelineConfig::new(), GemmDispatcher::cpu());

    let metrics = pipeline.run(&mut model, Some(&set)).unwrap().clone();
    assert_eq!(pipeline.stage(), QuantizationStage::Frozen);
    assert!(pipeline.succeeded());
    assert_eq!(metrics.layers_quantized, affine_count(&model));
    assert_eq!(metrics.observers_inserted, affine_count(&model));
    assert_eq!(metrics.layers_frozen, affine_count(&model));
    assert_eq!(metrics.calibration_passes, 4);
    assert!(metrics.compression_ratio() > 3.0, "QP-030 FALSIFIED: weak compression");
    assert!(metrics.layer_scales.iter().all(|s| s.act_scale.is_some_and(|a| a > 0.0)));
    let max_act = metrics.max_act_scale().unwrap();
    assert!(metrics.layer_scales.iter().all(|s| s.act_scale.unwrap() <= max_act));

    // Affine weights only: 9216 f32 elements per tiny decoder layer.
    assert_eq!(metrics.original_weight_bytes, 2 * 9216 * 4);
    assert_eq!(metrics.quantized_weight_bytes, 2 * 9216 + 14 * 4);

    assert_eq!(metrics.probe_drift.len(), 2);
    let drift = metrics.final_probe_drift().unwrap();
    assert!(drift < 0.5, "QP-030 FALSIFIED: probe drift {drift}");
    assert_eq!(pipeline.overall_progress(), 1.0);
}

#[test]
fn test_dynamic_scheme_stops_after_phase_one() {
    // TEST_ID: QP-031
    let mut model = tiny_model();
    let config = PipelineConfig::new().with_scheme(ActivationScheme::Dynamic);
    let mut pipeline = QuantizationPipeline::new(config, GemmDispatcher::cpu());

    pipeline.run(&mut model, None).unwrap();
    assert_eq!(pipeline.stage(), QuantizationStage::WeightsQuantized);
    assert!(pipeline.is_complete());
    assert!(pipeline.succeeded());
    let counts = model.decoder().count_by_kind();
    assert_eq!(counts[&ModuleKind::DynamicQuantLinear], affine_count(&model));
}

#[test]
fn test_phase_order_enforced() {
    // TEST_ID: QP-032
    let mut model = tiny_model();
    let mut pipeline = QuantizationPipeline::new(PipelineConfig::new(), GemmDispatcher::cpu());

    assert!(matches!(pipeline.freeze(&mut model), Err(Error::PhaseOrder { .. })));
    assert!(matches!(
        pipeline.calibrate(&mut model, &calibration_set(1)),
        Err(Error::PhaseOrder { .. })
    ));
    assert_eq!(pipeline.stage(), QuantizationStage::Idle, "QP-032 FALSIFIED: order error changed stage");

    pipeline.quantize_weights(&mut model).unwrap();
    assert!(matches!(pipeline.quantize_weights(&mut model), Err(Error::PhaseOrder { .. })));
}

#[test]
fn test_static_run_without_calibration_fails() {
    // TEST_ID: QP-033
    let mut model = tiny_model();
    let mut pipeline = QuantizationPipeline::new(PipelineConfig::new(), GemmDispatcher::cpu());
    assert!(matches!(pipeline.run(&mut model, None), Err(Error::EmptyCalibrationSet)));
    assert!(pipeline.failed());
    assert!(pipeline.error().is_some());
    assert_eq!(pipeline.overall_progress(), 0.0);
}

#[test]
fn test_empty_set_marks_pipeline_failed() {
    // TEST_ID: QP-034
    let mut model = tiny_model();
    let mut pipeline = QuantizationPipeline::new(PipelineConfig::new(), GemmDispatcher::cpu());
    let empty = CalibrationSet::from_token_rows(Vec::new(), &CalibrationDataConfig::new());
    assert!(matches!(
        pipeline.run(&mut model, Some(&empty)),
        Err(Error::EmptyCalibrationSet)
    ));
    assert_eq!(pipeline.stage(), QuantizationStage::Failed);
}

#[test]
fn test_reset_to_idle() {
    // TEST_ID: QP-035
    let mut model = tiny_model();
    let mut pipeline = QuantizationPipeline::new(PipelineConfig::new(), GemmDispatcher::cpu());
    pipeline.fail("boom");
    pipeline.reset();
    assert_eq!(pipeline.stage(), QuantizationStage::Idle);
    assert!(pipeline.error().is_none());
    assert_eq!(pipeline.metrics().layers_quantized, 0);
    pipeline.quantize_weights(&mut model).unwrap();
}

#[test]
fn test_explicit_probe_without_drift_measurement() {
    // TEST_ID: QP-036
    let mut model = tiny_model();
    let config = PipelineConfig::new().with_measure_drift(false);
    let mut pipeline = QuantizationPipeline::new(config, GemmDispatcher::cpu())
        .with_probe(&[1, 2, 3])
        .unwrap();
    pipeline.run(&mut model, Some(&calibration_set(1))).unwrap();
    assert!(pipeline.metrics().probe_drift.is_empty());
}

#[test]
fn test_native_and_fallback_runs_agree() {
    // TEST_ID: QP-037
    let set = calibration_set(2);
    let device = DeviceInfo::accelerator("sim").with_compute_capability(9, 0);
    let native = GemmDispatcher::with_emulated_native(device);
    assert_eq!(native.path(), GemmPath::Native);

    let mut a = tiny_model();
    let mut b = tiny_model();
    QuantizationPipeline::new(PipelineConfig::new(), native.clone())
        .run(&mut a, Some(&set))
        .unwrap();
    QuantizationPipeline::new(PipelineConfig::new(), GemmDispatcher::cpu())
        .run(&mut b, Some(&set))
        .unwrap();

    let tokens = set.row_tensor(0).unwrap();
    let out_a = a.hidden_states(&tokens, &native).unwrap();
    let out_b = b.hidden_states(&tokens, &GemmDispatcher::cpu()).unwrap();
    let err = crate::tensor::ops::relative_error(&out_a, &out_b).unwrap();
    assert!(err < 1e-2, "QP-037 FALSIFIED: native vs fallback error {err}");
}

// =============================================================================
// Export Tests
// =============================================================================

#[test]
fn test_export_static_model() {
    // TEST_ID: QP-040
    let mut model = tiny_model();
    let mut pipeline = QuantizationPipeline::new(PipelineConfig::new(), GemmDispatcher::cpu());
    pipeline.run(&mut model, Some(&calibration_set(2))).unwrap();

    let tmp = TempDir::new().unwrap();
    let result =
        export_quantized_model(&model, ActivationScheme::Static, pipeline.metrics(), tmp.path()).unwrap();
    assert!(result.weights_path.exists());
    assert!(result.metrics_path.exists());

    let bytes = std::fs::read(&result.weights_path).unwrap();
    let tensors = SafeTensors::deserialize(&bytes).unwrap();
    assert_eq!(tensors.len(), result.num_tensors);

    let w = tensors.tensor("model.layers.0.mlp.up_proj.weight").unwrap();
    assert_eq!(w.dtype(), Dtype::F8_E4M3);
    assert_eq!(w.shape(), &[64, 32]);

    let s = tensors.tensor("model.layers.0.mlp.up_proj.act_scale").unwrap();
    assert_eq!(s.dtype(), Dtype::F32);
    assert!(s.shape().is_empty());
    let act = f32::from_le_bytes(s.data().try_into().unwrap());
    assert!(act > 0.0);

    assert!(tensors.tensor("model.layers.0.mlp.up_proj.weight_scale").is_ok());
    assert_eq!(tensors.tensor("model.norm.weight").unwrap().dtype(), Dtype::F32);
    assert!(tensors.tensor("lm_head.weight").is_ok());
}

#[test]
fn test_export_config_and_metrics() {
    // TEST_ID: QP-041
    let mut model = tiny_model();
    let config = PipelineConfig::new().with_scheme(ActivationScheme::Dynamic);
    let mut pipeline = QuantizationPipeline::new(config, GemmDispatcher::cpu());
    pipeline.run(&mut model, None).unwrap();

    let tmp = TempDir::new().unwrap();
    let result =
        export_quantized_model(&model, ActivationScheme::Dynamic, pipeline.metrics(), tmp.path()).unwrap();

    let config: serde_json::Value =
        serde_json::from_str(&std::fs::read_to_string(&result.config_path).unwrap()).unwrap();
    assert_eq!(config["quantization_config"]["quant_method"], "fp8");
    assert_eq!(config["quantization_config"]["scheme"], "dynamic");
    assert_eq!(config["hidden_size"], 32);

    let report: MetricsReport =
        serde_json::from_str(&std::fs::read_to_string(&result.metrics_path).unwrap()).unwrap();
    assert_eq!(report.metrics.layers_quantized, affine_count(&model));
    assert_eq!(report.metrics.scheme, ActivationScheme::Dynamic);

    let bytes = std::fs::read(&result.weights_path).unwrap();
    let tensors = SafeTensors::deserialize(&bytes).unwrap();
    assert!(
        tensors.tensor("model.layers.1.self_attn.o_proj.act_scale").is_err(),
        "QP-041 FALSIFIED: dynamic layers have no activation scale"
    );
}
