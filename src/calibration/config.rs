//! Configuration for calibration data loading.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default number of calibration samples.
pub const DEFAULT_NUM_SAMPLES: usize = 512;

/// Default calibration sequence length.
pub const DEFAULT_MAX_SEQ_LEN: usize = 512;

/// Configuration for calibration data loading.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalibrationDataConfig {
    /// Number of calibration samples to keep.
    num_samples: usize,
    /// Every row is padded or truncated to this many tokens.
    max_seq_len: usize,
    /// Token used for right padding (usually the EOS token).
    pad_token_id: u32,
    /// JSON file of token-id rows; synthetic data when absent.
    source: Option<PathBuf>,
    /// Random seed for sample selection and synthetic data.
    seed: u64,
}

impl Default for CalibrationDataConfig {
    fn default() -> Self {
        Self {
            num_samples: DEFAULT_NUM_SAMPLES,
            max_seq_len: DEFAULT_MAX_SEQ_LEN,
            pad_token_id: 0,
            source: None,
            seed: 42,
        }
    }
}

impl CalibrationDataConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the number of calibration samples.
    pub fn with_num_samples(mut self, n: usize) -> Self {
        self.num_samples = n;
        self
    }

    /// Set the sequence length (at least 1).
    pub fn with_max_seq_len(mut self, len: usize) -> Self {
        self.max_seq_len = len.max(1);
        self
    }

    /// Set the padding token.
    pub fn with_pad_token_id(mut self, id: u32) -> Self {
        self.pad_token_id = id;
        self
    }

    /// Set the token file.
    pub fn with_source(mut self, path: impl Into<PathBuf>) -> Self {
        self.source = Some(path.into());
        self
    }

    /// Set the random seed.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    /// Get the number of calibration rows.
    pub fn num_samples(&self) -> usize {
        self.num_samples
    }

    /// Get the row length.
    pub fn max_seq_len(&self) -> usize {
        self.max_seq_len
    }

    /// Get the padding token id.
    pub fn pad_token_id(&self) -> u32 {
        self.pad_token_id
    }

    /// Get the calibration file, if any.
    pub fn source(&self) -> Option<&PathBuf> {
        self.source.as_ref()
    }

    /// Get the selection seed.
    pub fn seed(&self) -> u64 {
        self.seed
    }
}
