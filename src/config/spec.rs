//! Declarative quantization spec (YAML)
//!
//! ```yaml
//! model:
//!   path: ./models/llama-tiny
//! output:
//!   dir: ./llama-tiny-fp8
//! quantization:
//!   scheme: static
//!   compute_capability: "9.0"
//! calibration:
//!   num_samples: 512
//!   max_seq_len: 512
//!   data: ./calibration.json
//!   seed: 42
//! ```

use crate::calibration::{CalibrationDataConfig, DEFAULT_MAX_SEQ_LEN, DEFAULT_NUM_SAMPLES};
use crate::error::{Error, Result};
use crate::gemm::{ComputeCapability, DeviceInfo};
use crate::model::ModelConfig;
use crate::pipeline::{ActivationScheme, PipelineConfig};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Complete quantization specification.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizeSpec {
    pub model: ModelRef,
    #[serde(default)]
    pub output: OutputSpec,
    #[serde(default)]
    pub quantization: QuantizationSpec,
    #[serde(default)]
    pub calibration: CalibrationSpec,
}

/// Model to quantize.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelRef {
    /// Directory holding `config.json` and SafeTensors weights
    pub path: PathBuf,
}

/// Where the quantized checkpoint is written.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct OutputSpec {
    /// Output directory; required before running
    #[serde(default)]
    pub dir: Option<PathBuf>,
}

/// Quantization options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct QuantizationSpec {
    #[serde(default)]
    pub scheme: ActivationScheme,
    /// Capability to dispatch for, e.g. `"9.0"`; detected when absent
    #[serde(default)]
    pub compute_capability: Option<String>,
    /// Measure probe drift after each rewriting phase
    #[serde(default = "default_true")]
    pub measure_drift: bool,
}

impl Default for QuantizationSpec {
    fn default() -> Self {
        Self {
            scheme: ActivationScheme::default(),
            compute_capability: None,
            measure_drift: true,
        }
    }
}

/// Calibration data options.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationSpec {
    #[serde(default = "default_num_samples")]
    pub num_samples: usize,
    #[serde(default = "default_max_seq_len")]
    pub max_seq_len: usize,
    /// JSON file of token-id rows; synthetic rows when absent
    #[serde(default)]
    pub data: Option<PathBuf>,
    #[serde(default = "default_seed")]
    pub seed: u64,
    /// Pad token; the model's EOS token (or 0) when absent
    #[serde(default)]
    pub pad_token_id: Option<u32>,
}

impl Default for CalibrationSpec {
    fn default() -> Self {
        Self {
            num_samples: DEFAULT_NUM_SAMPLES,
            max_seq_len: DEFAULT_MAX_SEQ_LEN,
            data: None,
            seed: default_seed(),
            pad_token_id: None,
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_num_samples() -> usize {
    DEFAULT_NUM_SAMPLES
}

fn default_max_seq_len() -> usize {
    DEFAULT_MAX_SEQ_LEN
}

fn default_seed() -> u64 {
    42
}

impl QuantizeSpec {
    /// Spec with default options for a model directory.
    pub fn for_model(path: impl Into<PathBuf>) -> Self {
        Self {
            model: ModelRef { path: path.into() },
            output: OutputSpec::default(),
            quantization: QuantizationSpec::default(),
            calibration: CalibrationSpec::default(),
        }
    }

    /// Check the spec before any work is done.
    pub fn validate(&self) -> Result<()> {
        if self.model.path.as_os_str().is_empty() {
            return Err(Error::ConfigError("model.path must not be empty".into()));
        }
        if self.output.dir.is_none() {
            return Err(Error::ConfigError(
                "output directory is required (output.dir or --save-dir)".into(),
            ));
        }
        if self.quantization.scheme.needs_calibration() && self.calibration.num_samples == 0 {
            return Err(Error::EmptyCalibrationSet);
        }
        if self.calibration.max_seq_len == 0 {
            return Err(Error::ConfigError("calibration.max_seq_len must be > 0".into()));
        }
        if let Some(cap) = &self.quantization.compute_capability {
            cap.parse::<ComputeCapability>()?;
        }
        Ok(())
    }

    /// Get the output directory; errors when unset.
    pub fn output_dir(&self) -> Result<&Path> {
        self.output
            .dir
            .as_deref()
            .ok_or_else(|| Error::ConfigError("output directory is not set".into()))
    }

    /// Pipeline options derived from this spec.
    pub fn pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new()
            .with_scheme(self.quantization.scheme)
            .with_measure_drift(self.quantization.measure_drift)
    }

    /// Calibration loader settings; pads with the model's EOS token unless a
    /// pad token is given.
    pub fn calibration_config(&self, model: &ModelConfig) -> CalibrationDataConfig {
        let pad = self
            .calibration
            .pad_token_id
            .or_else(|| model.eos_token())
            .unwrap_or(0);
        let mut config = CalibrationDataConfig::new()
            .with_num_samples(self.calibration.num_samples)
            .with_max_seq_len(self.calibration.max_seq_len)
            .with_pad_token_id(pad)
            .with_seed(self.calibration.seed);
        if let Some(path) = &self.calibration.data {
            config = config.with_source(path);
        }
        config
    }

    /// Device from the configured capability, or the detected one.
    pub fn device(&self) -> Result<DeviceInfo> {
        match &self.quantization.compute_capability {
            Some(cap) => DeviceInfo::from_capability_str(cap),
            None => Ok(DeviceInfo::detect()),
        }
    }
}

/// Load a quantization spec from a YAML file.
///
/// The output directory may be left for the command line to fill in, so
/// only the parse is checked here; callers validate after overrides.
pub fn load_spec(path: impl AsRef<Path>) -> Result<QuantizeSpec> {
    let path = path.as_ref();
    let yaml = std::fs::read_to_string(path).map_err(|e| {
        Error::ConfigError(format!("Failed to read config file {}: {e}", path.display()))
    })?;
    serde_yaml::from_str(&yaml)
        .map_err(|e| Error::ConfigError(format!("Failed to parse YAML config: {e}")))
}
