//! Quantize command implementation

use crate::calibration::CalibrationSet;
use crate::cli::logging::log;
use crate::cli::LogLevel;
use crate::config::{apply_overrides, load_spec, QuantizeArgs, QuantizeSpec};
use crate::gemm::GemmDispatcher;
use crate::model::CausalLm;
use crate::pipeline::{export_quantized_model, QuantizationMetrics, QuantizationPipeline};

/// Build the `QuantizeSpec` from the optional YAML file plus command-line overrides.
fn resolve_spec(args: &QuantizeArgs) -> Result<QuantizeSpec, String> {
    let mut spec = match &args.config {
        Some(path) => load_spec(path).map_err(|e| e.to_string())?,
        None => QuantizeSpec::for_model(&args.model),
    };
    apply_overrides(&mut spec, args);
    spec.validate().map_err(|e| format!("Invalid config: {e}"))?;
    Ok(spec)
}

fn log_summary(level: LogLevel, metrics: &QuantizationMetrics) {
    log(level, LogLevel::Normal, "Quantization summary:");
    log(
        level,
        LogLevel::Normal,
        &format!("  Layers quantized: {}", metrics.layers_quantized),
    );
    log(
        level,
        LogLevel::Normal,
        &format!(
            "  Weight bytes: {} -> {} ({:.2}x)",
            metrics.original_weight_bytes,
            metrics.quantized_weight_bytes,
            metrics.compression_ratio()
        ),
    );
    if metrics.calibration_passes > 0 {
        log(
            level,
            LogLevel::Normal,
            &format!("  Calibration passes: {}", metrics.calibration_passes),
        );
    }
    if let Some(max_act) = metrics.max_act_scale() {
        log(
            level,
            LogLevel::Normal,
            &format!("  Max activation scale: {max_act:.6e}"),
        );
    }
    if let Some(drift) = metrics.final_probe_drift() {
        log(level, LogLevel::Normal, &format!("  Probe drift: {:.4}", drift));
    }
    for layer in &metrics.layer_scales {
        let act = layer
            .act_scale
            .map_or_else(|| "dynamic".to_string(), |s| format!("{s:.6e}"));
        log(
            level,
            LogLevel::Verbose,
            &format!("    {}: weight_scale={:.6e} act_scale={act}", layer.name, layer.weight_scale),
        );
    }
}

pub fn run_quantize(args: QuantizeArgs, level: LogLevel) -> Result<(), String> {
    let spec = resolve_spec(&args)?;
    let output_dir = spec.output_dir().map_err(|e| e.to_string())?.to_path_buf();

    log(
        level,
        LogLevel::Normal,
        &format!("Loading model: {}", spec.model.path.display()),
    );
    let mut model = CausalLm::from_pretrained(&spec.model.path).map_err(|e| e.to_string())?;

    let device = spec.device().map_err(|e| e.to_string())?;
    let gemm = GemmDispatcher::with_emulated_native(device);
    log(
        level,
        LogLevel::Verbose,
        &format!("  Device: {} ({} GEMM)", gemm.device().name, gemm.path().display_name()),
    );

    let scheme = spec.quantization.scheme;
    let calibration = if scheme.needs_calibration() {
        let config = spec.calibration_config(model.config());
        let set = CalibrationSet::load(&config, model.config().vocab_size)
            .map_err(|e| e.to_string())?;
        log(
            level,
            LogLevel::Normal,
            &format!("Calibrating with {} samples of {} tokens", set.len(), set.seq_len()),
        );
        Some(set)
    } else {
        None
    };

    let mut pipeline = QuantizationPipeline::new(spec.pipeline_config(), gemm);
    pipeline
        .run(&mut model, calibration.as_ref())
        .map_err(|e| format!("Quantization failed: {e}"))?;
    log_summary(level, pipeline.metrics());

    let result = export_quantized_model(&model, scheme, pipeline.metrics(), &output_dir)
        .map_err(|e| format!("Export failed: {e}"))?;
    log(
        level,
        LogLevel::Normal,
        &format!(
            "✓ Saved {} tensors ({:.2} MB) to {}",
            result.num_tensors,
            result.weights_bytes as f64 / 1_000_000.0,
            output_dir.display()
        ),
    );
    Ok(())
}
