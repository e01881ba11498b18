//! Causal multi-head attention kernel with grouped-query support.

use crate::error::{Error, Result};
use crate::tensor::Tensor;

pub const DEFAULT_ROPE_THETA: f32 = 10_000.0;

/// Head layout of an attention block.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AttentionShape {
    pub num_heads: usize,
    pub num_kv_heads: usize,
    pub rope_theta: f32,
}

impl AttentionShape {
    fn validate(&self, q_dim: usize) -> Result<usize> {
        if self.num_heads == 0
            || self.num_kv_heads == 0
            || q_dim % self.num_heads != 0
            || self.num_heads % self.num_kv_heads != 0
        {
            return Err(Error::InvalidGraph(format!(
                "attention with {} heads / {} kv heads cannot split width {q_dim}",
                self.num_heads, self.num_kv_heads
            )));
        }
        Ok(q_dim / self.num_heads)
    }
}

/// Rotate pairs `(d, d + head_dim/2)` of every head by the position angle.
fn apply_rope(values: &mut [f32], seq: usize, heads: usize, head_dim: usize, theta: f32) {
    let half = head_dim / 2;
    let width = heads * head_dim;
    for (pos, row) in values.chunks_mut(width).enumerate() {
        let pos = (pos % seq.max(1)) as f32;
        for head in row.chunks_mut(head_dim) {
            for d in 0..half {
                let freq = theta.powf(-2.0 * d as f32 / head_dim as f32);
                let (sin, cos) = (pos * freq).sin_cos();
                let (x1, x2) = (head[d], head[d + half]);
                head[d] = x1 * cos - x2 * sin;
                head[d + half] = x2 * cos + x1 * sin;
            }
        }
    }
}

/// Scaled dot-product attention with a causal mask.
///
/// `q` has shape `[.., seq, num_heads · head_dim]`, `k` and `v` have shape
/// `[.., seq, num_kv_heads · head_dim]`. Query heads share kv heads in
/// groups of `num_heads / num_kv_heads`. Positions restart at 0 per call.
pub fn causal_attention(q: &Tensor, k: &Tensor, v: &Tensor, shape: AttentionShape) -> Result<Tensor> {
    let q_shape = q.shape().to_vec();
    if q_shape.len() < 2 {
        return Err(Error::shape_mismatch("attention query rank", &[2], &q_shape));
    }
    let seq = q_shape[q_shape.len() - 2];
    let q_dim = q_shape[q_shape.len() - 1];
    let head_dim = shape.validate(q_dim)?;
    let kv_dim = head_dim * shape.num_kv_heads;

    let mut kv_shape = q_shape.clone();
    kv_shape[q_shape.len() - 1] = kv_dim;
    if k.shape() != kv_shape.as_slice() {
        return Err(Error::shape_mismatch("attention key", &kv_shape, k.shape()));
    }
    if v.shape() != kv_shape.as_slice() {
        return Err(Error::shape_mismatch("attention value", &kv_shape, v.shape()));
    }
    if q.numel() == 0 {
        return Ok(Tensor::zeros(&q_shape, q.dtype()));
    }

    let mut qv = q.to_vec();
    let mut kv = k.to_vec();
    let vv = v.to_vec();
    apply_rope(&mut qv, seq, shape.num_heads, head_dim, shape.rope_theta);
    apply_rope(&mut kv, seq, shape.num_kv_heads, head_dim, shape.rope_theta);

    let batch = q.numel() / (seq * q_dim);
    let group = shape.num_heads / shape.num_kv_heads;
    let softmax_scale = 1.0 / (head_dim as f32).sqrt();
    let mut out = vec![0.0f32; q.numel()];
    let mut scores = Vec::with_capacity(seq);

    for b in 0..batch {
        for h in 0..shape.num_heads {
            let kv_head = h / group;
            for i in 0..seq {
                let q_off = (b * seq + i) * q_dim + h * head_dim;
                let query = &qv[q_off..q_off + head_dim];

                scores.clear();
                for j in 0..=i {
                    let k_off = (b * seq + j) * kv_dim + kv_head * head_dim;
                    let dot: f32 = query
                        .iter()
                        .zip(&kv[k_off..k_off + head_dim])
                        .map(|(a, b)| a * b)
                        .sum();
                    scores.push(dot * softmax_scale);
                }

                let max = scores.iter().copied().fold(f32::NEG_INFINITY, f32::max);
                let mut denom = 0.0;
                for s in scores.iter_mut() {
                    *s = (*s - max).exp();
                    denom += *s;
                }

                let dst = &mut out[q_off..q_off + head_dim];
                for (j, p) in scores.iter().enumerate() {
                    let v_off = (b * seq + j) * kv_dim + kv_head * head_dim;
                    let weight = p / denom;
                    for (o, val) in dst.iter_mut().zip(&vv[v_off..v_off + head_dim]) {
                        *o += weight * val;
                    }
                }
            }
        }
    }

    Tensor::from_vec(out, &q_shape, q.dtype())
}
