//! Token embedding lookup.

use crate::error::{Error, Result};
use crate::tensor::Tensor;
use ndarray::{Array2, Axis, IxDyn};

/// Embedding table of shape `[vocab_size, hidden_size]`.
#[derive(Debug, Clone, PartialEq)]
pub struct Embedding {
    weight: Tensor,
}

impl Embedding {
    /// Create an embedding from a `[vocab, hidden]` table.
    pub fn new(weight: Tensor) -> Result<Self> {
        if weight.ndim() != 2 {
            return Err(Error::shape_mismatch("embedding weight rank", &[2], weight.shape()));
        }
        Ok(Self { weight })
    }

    /// Get the embedding table.
    pub fn weight(&self) -> &Tensor {
        &self.weight
    }

    /// Get the vocabulary size.
    pub fn vocab_size(&self) -> usize {
        self.weight.shape()[0]
    }

    /// Get the embedding width.
    pub fn hidden_size(&self) -> usize {
        self.weight.shape()[1]
    }

    /// Look up token ids; output shape is `tokens.shape() + [hidden_size]`.
    pub fn forward(&self, tokens: &Tensor) -> Result<Tensor> {
        let vocab_size = self.vocab_size();
        let hidden = self.hidden_size();
        let table = self.weight.data();

        let mut out = Array2::<f32>::zeros((tokens.numel(), hidden));
        for (mut row, &id) in out.axis_iter_mut(Axis(0)).zip(tokens.data().iter()) {
            let token = id as i64;
            if token < 0 || token as usize >= vocab_size || id.fract() != 0.0 {
                return Err(Error::TokenOutOfRange { token, vocab_size });
            }
            row.assign(&table.index_axis(Axis(0), token as usize));
        }

        let mut shape = tokens.shape().to_vec();
        shape.push(hidden);
        let out = out
            .into_shape_with_order(IxDyn(&shape))
            .map_err(|e| Error::InvalidGraph(format!("embedding: {e}")))?;
        Ok(Tensor::new(out, self.weight.dtype()))
    }
}
