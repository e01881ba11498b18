//! Quantized model export
//!
//! Writes a Hugging Face style directory:
//! - `model.safetensors`: FP8 weights as `F8_E4M3`, `weight_scale` and
//!   `act_scale` as F32 scalars, everything else at its own dtype
//! - `config.json`: the model config with a `quantization_config` entry
//! - `quantization_metrics.json`: pipeline metrics with a timestamp

use super::config::ActivationScheme;
use super::metrics::QuantizationMetrics;
use crate::error::{Error, Result};
use crate::graph::Module;
use crate::model::{tensor_to_bytes, CausalLm, QuantizationDescriptor};
use crate::quant::QuantizedTensor;
use crate::tensor::Tensor;
use chrono::{DateTime, Utc};
use safetensors::tensor::TensorView;
use safetensors::Dtype;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Weight file name inside the export directory.
pub const WEIGHTS_FILE: &str = "model.safetensors";
/// Metrics sidecar name inside the export directory.
pub const METRICS_FILE: &str = "quantization_metrics.json";

/// Result of a quantized model export.
#[derive(Debug, Clone)]
pub struct ExportResult {
    /// Path to the exported weight file
    pub weights_path: PathBuf,
    /// Path to the rewritten config.json
    pub config_path: PathBuf,
    /// Path to the metrics sidecar
    pub metrics_path: PathBuf,
    /// Number of tensors exported
    pub num_tensors: usize,
    /// Size of the weight file in bytes
    pub weights_bytes: u64,
}

/// Metrics sidecar (serialized to quantization_metrics.json)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsReport {
    /// Format version
    pub version: String,
    /// Export time (UTC)
    pub exported_at: DateTime<Utc>,
    /// Pipeline metrics
    pub metrics: QuantizationMetrics,
}

struct Entry {
    name: String,
    dtype: Dtype,
    shape: Vec<usize>,
    bytes: Vec<u8>,
}

impl Entry {
    fn tensor(name: String, tensor: &Tensor) -> Self {
        let (dtype, bytes) = tensor_to_bytes(tensor);
        Self {
            name,
            dtype,
            shape: tensor.shape().to_vec(),
            bytes,
        }
    }

    fn fp8(name: String, q: &QuantizedTensor) -> Self {
        Self {
            name,
            dtype: Dtype::F8_E4M3,
            shape: q.shape.clone(),
            bytes: q.data.clone(),
        }
    }

    fn scalar(name: String, value: f32) -> Self {
        Self {
            name,
            dtype: Dtype::F32,
            shape: Vec::new(),
            bytes: value.to_le_bytes().to_vec(),
        }
    }
}

fn collect_entries(model: &CausalLm) -> Vec<Entry> {
    let mut entries = Vec::new();
    for (path, module) in model.decoder().named_modules() {
        let prefix = format!("model.{path}");
        let (weight, weight_scale, act_scale, bias) = match module {
            Module::Container(_) | Module::Activation(_) => continue,
            Module::Embedding(e) => {
                entries.push(Entry::tensor(format!("{prefix}.weight"), e.weight()));
                continue;
            }
            Module::RmsNorm(n) => {
                entries.push(Entry::tensor(format!("{prefix}.weight"), n.weight()));
                continue;
            }
            Module::Linear(l) => {
                entries.push(Entry::tensor(format!("{prefix}.weight"), l.weight()));
                if let Some(b) = l.bias() {
                    entries.push(Entry::tensor(format!("{prefix}.bias"), b));
                }
                continue;
            }
            Module::DynamicQuantLinear(l) => (l.weight(), l.weight_scale(), None, l.bias()),
            Module::CalibratingObserver(l) => {
                (l.weight(), l.weight_scale(), l.observed_scale(), l.bias())
            }
            Module::StaticQuantLinear(l) => {
                (l.weight(), l.weight_scale(), Some(l.act_scale()), l.bias())
            }
        };
        entries.push(Entry::fp8(format!("{prefix}.weight"), weight));
        entries.push(Entry::scalar(format!("{prefix}.weight_scale"), weight_scale));
        if let Some(s) = act_scale {
            entries.push(Entry::scalar(format!("{prefix}.act_scale"), s));
        }
        if let Some(b) = bias {
            entries.push(Entry::tensor(format!("{prefix}.bias"), b));
        }
    }
    if !model.is_tied() {
        entries.push(Entry::tensor("lm_head.weight".to_string(), model.lm_head().weight()));
    }
    entries
}

/// Export a quantized model, its config and metrics into `output_dir`.
pub fn export_quantized_model(
    model: &CausalLm,
    scheme: ActivationScheme,
    metrics: &QuantizationMetrics,
    output_dir: impl AsRef<Path>,
) -> Result<ExportResult> {
    let output_dir = output_dir.as_ref();
    std::fs::create_dir_all(output_dir)?;

    let mut entries = collect_entries(model);
    entries.sort_by(|a, b| a.name.cmp(&b.name));

    let weights_path = output_dir.join(WEIGHTS_FILE);
    let views = entries
        .iter()
        .map(|e| {
            TensorView::new(e.dtype, e.shape.clone(), &e.bytes)
                .map(|view| (e.name.as_str(), view))
                .map_err(|err| Error::Serialization(format!("tensor '{}': {err}", e.name)))
        })
        .collect::<Result<Vec<_>>>()?;
    let bytes = safetensors::serialize(views, None)?;
    let weights_bytes = bytes.len() as u64;
    std::fs::write(&weights_path, bytes)?;

    let mut config = model.config().clone();
    config.quantization_config = Some(QuantizationDescriptor::fp8(scheme));
    let config_path = output_dir.join("config.json");
    std::fs::write(&config_path, serde_json::to_string_pretty(&config)?)?;

    let report = MetricsReport {
        version: "1.0".to_string(),
        exported_at: Utc::now(),
        metrics: metrics.clone(),
    };
    let metrics_path = output_dir.join(METRICS_FILE);
    std::fs::write(&metrics_path, serde_json::to_string_pretty(&report)?)?;

    tracing::info!(
        path = %weights_path.display(),
        tensors = entries.len(),
        bytes = weights_bytes,
        "exported quantized model"
    );

    Ok(ExportResult {
        weights_path,
        config_path,
        metrics_path,
        num_tensors: entries.len(),
        weights_bytes,
    })
}
