//! SafeTensors weight loading and tensor (de)serialization.

use super::ModelConfig;
use crate::error::{Error, Result};
use crate::quant::fp8;
use crate::tensor::{DType, Tensor};
use safetensors::tensor::TensorView;
use safetensors::{Dtype, SafeTensors};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Find SafeTensors files in a directory, or return a single file.
///
/// A directory with `model.safetensors` yields that file only; otherwise all
/// `*.safetensors` shards are returned in name order.
pub fn find_safetensors_files(path: &Path) -> Result<Vec<PathBuf>> {
    let is_safetensors = |p: &Path| p.extension().is_some_and(|e| e == "safetensors");

    if path.is_file() {
        return Ok(if is_safetensors(path) {
            vec![path.to_path_buf()]
        } else {
            Vec::new()
        });
    }

    let single = path.join("model.safetensors");
    if single.exists() {
        return Ok(vec![single]);
    }

    let mut files = Vec::new();
    if let Ok(entries) = std::fs::read_dir(path) {
        for entry in entries.flatten() {
            let p = entry.path();
            if is_safetensors(&p) {
                files.push(p);
            }
        }
    }
    files.sort();
    Ok(files)
}

/// Load every tensor from the SafeTensors file(s) under `path`.
pub fn load_safetensors(path: &Path) -> Result<HashMap<String, Tensor>> {
    let files = find_safetensors_files(path)?;
    if files.is_empty() {
        return Err(Error::ConfigError(format!(
            "No SafeTensors files found in {}",
            path.display()
        )));
    }

    let mut weights = HashMap::new();
    for file in &files {
        let data = std::fs::read(file)
            .map_err(|e| Error::ConfigError(format!("Failed to read {}: {e}", file.display())))?;
        let tensors = SafeTensors::deserialize(&data).map_err(|e| {
            Error::ConfigError(format!("Failed to parse SafeTensors {}: {e}", file.display()))
        })?;
        for (name, view) in tensors.tensors() {
            let tensor = tensor_from_view(&view)
                .map_err(|e| Error::ConfigError(format!("tensor '{name}': {e}")))?;
            weights.insert(name, tensor);
        }
    }

    tracing::info!(files = files.len(), tensors = weights.len(), "loaded SafeTensors weights");
    Ok(weights)
}

fn chunks<const N: usize>(data: &[u8]) -> impl Iterator<Item = [u8; N]> + '_ {
    data.chunks_exact(N).map(|c| {
        let mut bytes = [0u8; N];
        bytes.copy_from_slice(c);
        bytes
    })
}

/// Convert a SafeTensors view into a [`Tensor`].
pub fn tensor_from_view(view: &TensorView<'_>) -> Result<Tensor> {
    let data = view.data();
    let (values, dtype): (Vec<f32>, DType) = match view.dtype() {
        Dtype::F32 => (chunks::<4>(data).map(f32::from_le_bytes).collect(), DType::F32),
        Dtype::F16 => (
            chunks::<2>(data)
                .map(|b| half::f16::from_bits(u16::from_le_bytes(b)).to_f32())
                .collect(),
            DType::F16,
        ),
        Dtype::BF16 => (
            chunks::<2>(data)
                .map(|b| half::bf16::from_bits(u16::from_le_bytes(b)).to_f32())
                .collect(),
            DType::BF16,
        ),
        Dtype::F8_E4M3 => (fp8::decode_slice(data), DType::F8E4M3),
        Dtype::I32 => (
            chunks::<4>(data).map(|b| i32::from_le_bytes(b) as f32).collect(),
            DType::I32,
        ),
        Dtype::I64 => (
            chunks::<8>(data).map(|b| i64::from_le_bytes(b) as f32).collect(),
            DType::I64,
        ),
        Dtype::BOOL => (data.iter().map(|&b| f32::from(u8::from(b != 0))).collect(), DType::Bool),
        other => {
            return Err(Error::InvalidDtype {
                value: format!("{other:?}"),
            })
        }
    };
    Tensor::from_vec(values, view.shape(), dtype)
}

/// Serialize a [`Tensor`] to little-endian bytes at its own dtype.
pub fn tensor_to_bytes(tensor: &Tensor) -> (Dtype, Vec<u8>) {
    let values = tensor.data().iter().copied();
    match tensor.dtype() {
        DType::F32 => {
            let flat: Vec<f32> = values.collect();
            (Dtype::F32, bytemuck::cast_slice(&flat).to_vec())
        }
        DType::F16 => (
            Dtype::F16,
            values
                .flat_map(|v| half::f16::from_f32(v).to_bits().to_le_bytes())
                .collect(),
        ),
        DType::BF16 => (
            Dtype::BF16,
            values
                .flat_map(|v| half::bf16::from_f32(v).to_bits().to_le_bytes())
                .collect(),
        ),
        DType::F8E4M3 => (Dtype::F8_E4M3, values.map(fp8::f32_to_e4m3).collect()),
        DType::I32 => (Dtype::I32, values.flat_map(|v| (v as i32).to_le_bytes()).collect()),
        DType::I64 => (Dtype::I64, values.flat_map(|v| (v as i64).to_le_bytes()).collect()),
        DType::Bool => (Dtype::BOOL, values.map(|v| u8::from(v != 0.0)).collect()),
    }
}

/// Write `config.json` and a single `model.safetensors` for an unquantized
/// checkpoint.
///
/// Decoder tensors are stored under the `model.` prefix; `lm_head.weight`
/// stays at the top level.
pub fn save_checkpoint(
    dir: &Path,
    config: &ModelConfig,
    weights: &HashMap<String, Tensor>,
) -> Result<()> {
    std::fs::create_dir_all(dir)?;

    let mut encoded: Vec<(String, Dtype, Vec<usize>, Vec<u8>)> = weights
        .iter()
        .map(|(name, tensor)| {
            let name = if name == "lm_head.weight" {
                name.clone()
            } else {
                format!("model.{name}")
            };
            let (dtype, bytes) = tensor_to_bytes(tensor);
            (name, dtype, tensor.shape().to_vec(), bytes)
        })
        .collect();
    encoded.sort_by(|a, b| a.0.cmp(&b.0));

    let views = encoded
        .iter()
        .map(|(name, dtype, shape, bytes)| {
            TensorView::new(*dtype, shape.clone(), bytes).map(|view| (name.as_str(), view))
        })
        .collect::<std::result::Result<Vec<_>, _>>()?;
    std::fs::write(dir.join("model.safetensors"), safetensors::serialize(views, None)?)?;
    std::fs::write(dir.join("config.json"), serde_json::to_string_pretty(config)?)?;
    Ok(())
}
