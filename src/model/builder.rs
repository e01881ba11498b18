//! Llama-style decoder graph construction.
//!
//! Parameter names follow the Hugging Face layout relative to the inner
//! decoder (`embed_tokens.weight`, `layers.0.self_attn.q_proj.weight`, ...).

use super::ModelConfig;
use crate::error::{Error, Result};
use crate::graph::{Container, ContainerKind, ModelGraph, Module};
use crate::nn::{Embedding, Linear, RmsNorm};
use crate::quant::{fp8, DynamicQuantLinear, QuantizedTensor, StaticQuantLinear};
use crate::tensor::{DType, Tensor};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::collections::HashMap;
use std::sync::Arc;

/// Remove a required tensor from the map.
fn take(weights: &mut HashMap<String, Tensor>, name: &str) -> Result<Tensor> {
    weights.remove(name).ok_or_else(|| Error::MissingTensor {
        name: name.to_string(),
    })
}

fn take_scalar(weights: &mut HashMap<String, Tensor>, name: &str) -> Result<f32> {
    let tensor = take(weights, name)?;
    match tensor.data().iter().next() {
        Some(&v) if tensor.numel() == 1 => Ok(v),
        _ => Err(Error::shape_mismatch(name.to_string(), &[], tensor.shape())),
    }
}

/// Affine layer at `prefix`.
///
/// A full-precision checkpoint yields a `Linear`. A quantized one (FP8
/// `weight` plus `weight_scale`) yields a `DynamicQuantLinear`, or a
/// `StaticQuantLinear` when an `act_scale` is present too.
fn take_affine(
    weights: &mut HashMap<String, Tensor>,
    prefix: &str,
    expected: [usize; 2],
    with_bias: bool,
    dtype: DType,
) -> Result<Module> {
    let name = format!("{prefix}.weight");
    let weight = take(weights, &name)?;
    if weight.shape() != expected {
        return Err(Error::shape_mismatch(name, &expected, weight.shape()));
    }
    let bias = if with_bias {
        Some(take(weights, &format!("{prefix}.bias"))?)
    } else {
        weights.remove(&format!("{prefix}.bias"))
    };

    let scale_name = format!("{prefix}.weight_scale");
    if !weights.contains_key(&scale_name) {
        return Ok(Module::Linear(Linear::new(weight, bias)?));
    }
    if weight.dtype() != DType::F8E4M3 {
        return Err(Error::InvalidDtype {
            value: format!("{name} has a weight_scale but dtype {}", weight.dtype()),
        });
    }
    let scale = take_scalar(weights, &scale_name)?;
    if !scale.is_finite() || scale <= 0.0 {
        return Err(Error::InvalidScale { scale });
    }
    let quantized = Arc::new(QuantizedTensor {
        data: fp8::encode_slice(&weight.to_vec()),
        shape: weight.shape().to_vec(),
        scale,
        orig_dtype: dtype,
    });

    let act_name = format!("{prefix}.act_scale");
    if weights.contains_key(&act_name) {
        let act_scale = take_scalar(weights, &act_name)?;
        Ok(Module::StaticQuantLinear(StaticQuantLinear::new(quantized, bias, act_scale)?))
    } else {
        Ok(Module::DynamicQuantLinear(DynamicQuantLinear::new(quantized, bias)))
    }
}

fn take_norm(weights: &mut HashMap<String, Tensor>, prefix: &str, config: &ModelConfig) -> Result<RmsNorm> {
    RmsNorm::new(take(weights, &format!("{prefix}.weight"))?, config.rms_norm_eps)
}

/// Build the decoder graph, consuming the matching entries of `weights`.
///
/// Tensors that are not part of the decoder (e.g. `lm_head.weight`) stay in
/// the map.
pub fn build_decoder(config: &ModelConfig, weights: &mut HashMap<String, Tensor>) -> Result<ModelGraph> {
    config.validate()?;
    let hidden = config.hidden_size;
    let inter = config.intermediate_size;
    let kv_dim = config.num_kv_heads() * config.head_dim();
    let activation = config.activation()?;
    let dtype = config.dtype()?;

    let embed = Embedding::new(take(weights, "embed_tokens.weight")?)?;
    if embed.hidden_size() != hidden {
        return Err(Error::shape_mismatch(
            "embed_tokens.weight",
            &[config.vocab_size, hidden],
            embed.weight().shape(),
        ));
    }

    let mut layers = Container::sequential();
    for i in 0..config.num_hidden_layers {
        let p = format!("layers.{i}");
        let ab = config.attention_bias;
        let mb = config.mlp_bias;

        let attn = Container::new(ContainerKind::Attention {
            num_heads: config.num_attention_heads,
            num_kv_heads: config.num_kv_heads(),
            rope_theta: config.rope_theta,
        })
        .with_child("q_proj", take_affine(weights, &format!("{p}.self_attn.q_proj"), [hidden, hidden], ab, dtype)?)?
        .with_child("k_proj", take_affine(weights, &format!("{p}.self_attn.k_proj"), [kv_dim, hidden], ab, dtype)?)?
        .with_child("v_proj", take_affine(weights, &format!("{p}.self_attn.v_proj"), [kv_dim, hidden], ab, dtype)?)?
        .with_child("o_proj", take_affine(weights, &format!("{p}.self_attn.o_proj"), [hidden, hidden], ab, dtype)?)?;

        let mlp = Container::new(ContainerKind::GatedMlp)
            .with_child("gate_proj", take_affine(weights, &format!("{p}.mlp.gate_proj"), [inter, hidden], mb, dtype)?)?
            .with_child("up_proj", take_affine(weights, &format!("{p}.mlp.up_proj"), [inter, hidden], mb, dtype)?)?
            .with_child("down_proj", take_affine(weights, &format!("{p}.mlp.down_proj"), [hidden, inter], mb, dtype)?)?
            .with_child("act_fn", Module::Activation(activation))?;

        let layer = Container::new(ContainerKind::DecoderLayer)
            .with_child("input_layernorm", Module::RmsNorm(take_norm(weights, &format!("{p}.input_layernorm"), config)?))?
            .with_child("self_attn", attn)?
            .with_child(
                "post_attention_layernorm",
                Module::RmsNorm(take_norm(weights, &format!("{p}.post_attention_layernorm"), config)?),
            )?
            .with_child("mlp", mlp)?;

        layers.push(i.to_string(), layer)?;
    }

    let root = Container::sequential()
        .with_child("embed_tokens", Module::Embedding(embed))?
        .with_child("layers", layers)?
        .with_child("norm", Module::RmsNorm(take_norm(weights, "norm", config)?))?;

    Ok(ModelGraph::new(root))
}

/// Seeded random parameters for every tensor `build_decoder` expects, plus
/// `lm_head.weight` unless embeddings are tied.
pub fn synthetic_weights(config: &ModelConfig, seed: u64) -> Result<HashMap<String, Tensor>> {
    config.validate()?;
    let dtype = config.dtype()?;
    let hidden = config.hidden_size;
    let inter = config.intermediate_size;
    let kv_dim = config.num_kv_heads() * config.head_dim();
    if dtype == DType::F8E4M3 {
        return Err(Error::InvalidDtype {
            value: "synthetic weights cannot be generated directly in float8".into(),
        });
    }
    let mut rng = StdRng::seed_from_u64(seed);
    let mut weights = HashMap::new();

    let uniform = |shape: &[usize], bound: f32, rng: &mut StdRng| -> Result<Tensor> {
        let n: usize = shape.iter().product();
        let values = (0..n).map(|_| (rng.random::<f32>() * 2.0 - 1.0) * bound).collect();
        Tensor::from_vec(values, shape, dtype)
    };
    let add_linear = |weights: &mut HashMap<String, Tensor>,
                          rng: &mut StdRng,
                          prefix: String,
                          out: usize,
                          inp: usize,
                          bias: bool|
     -> Result<()> {
        let bound = 1.0 / (inp.max(1) as f32).sqrt();
        weights.insert(format!("{prefix}.weight"), uniform(&[out, inp], bound, rng)?);
        if bias {
            weights.insert(format!("{prefix}.bias"), uniform(&[out], bound, rng)?);
        }
        Ok(())
    };

    let ones = |n: usize| Tensor::full(&[n], 1.0, dtype);

    weights.insert(
        "embed_tokens.weight".to_string(),
        Tensor::from_vec(
            (0..config.vocab_size * hidden)
                .map(|_| rng.random::<f32>() * 2.0 - 1.0)
                .collect(),
            &[config.vocab_size, hidden],
            dtype,
        )?,
    );

    for i in 0..config.num_hidden_layers {
        let p = format!("layers.{i}");
        let (ab, mb) = (config.attention_bias, config.mlp_bias);
        add_linear(&mut weights, &mut rng, format!("{p}.self_attn.q_proj"), hidden, hidden, ab)?;
        add_linear(&mut weights, &mut rng, format!("{p}.self_attn.k_proj"), kv_dim, hidden, ab)?;
        add_linear(&mut weights, &mut rng, format!("{p}.self_attn.v_proj"), kv_dim, hidden, ab)?;
        add_linear(&mut weights, &mut rng, format!("{p}.self_attn.o_proj"), hidden, hidden, ab)?;
        add_linear(&mut weights, &mut rng, format!("{p}.mlp.gate_proj"), inter, hidden, mb)?;
        add_linear(&mut weights, &mut rng, format!("{p}.mlp.up_proj"), inter, hidden, mb)?;
        add_linear(&mut weights, &mut rng, format!("{p}.mlp.down_proj"), hidden, inter, mb)?;
        weights.insert(format!("{p}.input_layernorm.weight"), ones(hidden));
        weights.insert(format!("{p}.post_attention_layernorm.weight"), ones(hidden));
    }
    weights.insert("norm.weight".to_string(), ones(hidden));

    if !config.tie_word_embeddings {
        add_linear(&mut weights, &mut rng, "lm_head".to_string(), config.vocab_size, hidden, false)?;
    }
    Ok(weights)
}
