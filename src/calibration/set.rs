//! Fixed-length token rows used to calibrate activation scales.

use super::config::CalibrationDataConfig;
use crate::error::{Error, Result};
use crate::tensor::Tensor;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use std::path::Path;

/// Ordered, read-only set of token rows, all of length `seq_len`.
#[derive(Debug, Clone, PartialEq)]
pub struct CalibrationSet {
    rows: Vec<Vec<u32>>,
    seq_len: usize,
    padded_tokens: usize,
}

impl CalibrationSet {
    /// Select `num_samples` rows after a seeded shuffle, then pad (right, with
    /// `pad_token_id`) or truncate each row to `max_seq_len`.
    pub fn from_token_rows(mut rows: Vec<Vec<u32>>, config: &CalibrationDataConfig) -> Self {
        let mut rng = StdRng::seed_from_u64(config.seed());
        rows.shuffle(&mut rng);
        let available = rows.len();
        if available < config.num_samples() {
            tracing::warn!(
                requested = config.num_samples(),
                available,
                "calibration data has fewer rows than requested, using all of them"
            );
        }
        rows.truncate(config.num_samples());

        let seq_len = config.max_seq_len();
        let mut padded_tokens = 0;
        for row in &mut rows {
            if row.len() < seq_len {
                padded_tokens += seq_len - row.len();
                row.resize(seq_len, config.pad_token_id());
            } else {
                row.truncate(seq_len);
            }
        }

        Self {
            rows,
            seq_len,
            padded_tokens,
        }
    }

    /// Load rows from a JSON file containing an array of token-id arrays.
    pub fn from_json_file(path: impl AsRef<Path>, config: &CalibrationDataConfig) -> Result<Self> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|e| {
            Error::ConfigError(format!("Failed to read calibration data {}: {e}", path.display()))
        })?;
        let rows: Vec<Vec<u32>> = serde_json::from_str(&content).map_err(|e| {
            Error::ConfigError(format!("Failed to parse calibration data {}: {e}", path.display()))
        })?;
        Ok(Self::from_token_rows(rows, config))
    }

    /// Seeded random token rows drawn uniformly from `0..vocab_size`.
    pub fn synthetic(config: &CalibrationDataConfig, vocab_size: usize) -> Result<Self> {
        if vocab_size == 0 {
            return Err(Error::ConfigError("synthetic calibration needs vocab_size > 0".into()));
        }
        let vocab = u32::try_from(vocab_size)
            .map_err(|_| Error::ConfigError(format!("vocab_size {vocab_size} exceeds u32")))?;
        let mut rng = StdRng::seed_from_u64(config.seed());
        let rows = (0..config.num_samples())
            .map(|_| {
                (0..config.max_seq_len())
                    .map(|_| rng.random_range(0..vocab))
                    .collect()
            })
            .collect();
        Ok(Self {
            rows,
            seq_len: config.max_seq_len(),
            padded_tokens: 0,
        })
    }

    /// Load from `config.source()` if set, otherwise generate synthetic rows.
    pub fn load(config: &CalibrationDataConfig, vocab_size: usize) -> Result<Self> {
        match config.source() {
            Some(path) => Self::from_json_file(path, config),
            None => Self::synthetic(config, vocab_size),
        }
    }

    /// Get the number of rows.
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    /// Check if the set has no rows.
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get the fixed row length.
    pub fn seq_len(&self) -> usize {
        self.seq_len
    }

    /// Number of padding tokens that were appended.
    pub fn padded_tokens(&self) -> usize {
        self.padded_tokens
    }

    /// Get one row of token ids.
    pub fn row(&self, index: usize) -> Option<&[u32]> {
        self.rows.get(index).map(Vec::as_slice)
    }

    /// Iterate over rows in selection order.
    pub fn iter(&self) -> impl ExactSizeIterator<Item = &[u32]> + '_ {
        self.rows.iter().map(Vec::as_slice)
    }

    /// Row `index` as a `[1, seq_len]` token tensor.
    pub fn row_tensor(&self, index: usize) -> Result<Tensor> {
        let row = self.row(index).ok_or_else(|| {
            Error::ConfigError(format!("calibration row {index} out of range ({} rows)", self.len()))
        })?;
        Tensor::from_tokens(row, 1, row.len())
    }

    /// Largest token id, for vocabulary checks.
    pub fn max_token(&self) -> Option<u32> {
        self.rows.iter().flatten().copied().max()
    }
}
