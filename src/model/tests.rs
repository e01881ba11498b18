use super::*;
use crate::error::Error;
use crate::gemm::GemmDispatcher;
use crate::graph::{Module, ModuleKind};
use crate::pipeline::ActivationScheme;
use crate::tensor::{DType, Tensor};
use safetensors::SafeTensors;
use tempfile::TempDir;

#[test]
fn test_config_defaults_from_json() {
    let json = r#"{
        "hidden_size": 64,
        "intermediate_size": 128,
        "num_hidden_layers": 2,
        "num_attention_heads": 8,
        "vocab_size": 1000,
        "model_type": "llama",
        "eos_token_id": [7, 9]
    }"#;
    let config: ModelConfig = serde_json::from_str(json).unwrap();
    assert_eq!(config.num_kv_heads(), 8);
    assert_eq!(config.head_dim(), 8);
    assert_eq!(config.hidden_act, "silu");
    assert_eq!(config.eos_token(), Some(7));
    assert_eq!(config.dtype().unwrap(), DType::F32);
    assert_eq!(config.extra.get("model_type").unwrap(), "llama");
    config.validate().unwrap();
}

#[test]
fn test_config_writes_quantization_entry() {
    let mut config = ModelConfig::tiny();
    config.quantization_config = Some(QuantizationDescriptor::fp8(ActivationScheme::Static));
    let value = serde_json::to_value(&config).unwrap();
    assert_eq!(value["quantization_config"]["quant_method"], "fp8");
    assert_eq!(value["quantization_config"]["scheme"], "static");
}

#[test]
fn test_config_validation() {
    let mut config = ModelConfig::tiny();
    config.num_attention_heads = 5;
    assert!(matches!(config.validate(), Err(Error::ConfigError(_))));

    let mut config = ModelConfig::tiny();
    config.num_key_value_heads = Some(3);
    assert!(matches!(config.validate(), Err(Error::ConfigError(_))));

    let mut config = ModelConfig::tiny();
    config.hidden_act = "swish_v9".to_string();
    assert!(config.validate().is_err());
}

#[test]
fn test_build_decoder_layout() {
    let config = ModelConfig::tiny();
    let mut weights = synthetic_weights(&config, 1).unwrap();
    let graph = build_decoder(&config, &mut weights).unwrap();

    assert!(weights.contains_key("lm_head.weight"), "head is left for the caller");
    assert_eq!(weights.len(), 1);

    let counts = graph.count_by_kind();
    assert_eq!(counts[&ModuleKind::Linear], 7 * config.num_hidden_layers);
    assert_eq!(counts[&ModuleKind::Embedding], 1);
    assert!(graph.get_submodule("layers.1.mlp.down_proj").unwrap().is_linear());
    assert!(matches!(
        graph.get_submodule("layers.0.self_attn.k_proj").unwrap(),
        Module::Linear(l) if l.out_features() == 16
    ));
}

#[test]
fn test_build_decoder_missing_tensor() {
    let config = ModelConfig::tiny();
    let mut weights = synthetic_weights(&config, 1).unwrap();
    weights.remove("layers.1.mlp.up_proj.weight");
    match build_decoder(&config, &mut weights) {
        Err(Error::MissingTensor { name }) => assert_eq!(name, "layers.1.mlp.up_proj.weight"),
        other => panic!("expected MissingTensor, got {other:?}"),
    }
}

#[test]
fn test_build_decoder_shape_mismatch() {
    let config = ModelConfig::tiny();
    let mut weights = synthetic_weights(&config, 1).unwrap();
    weights.insert(
        "layers.0.self_attn.q_proj.weight".to_string(),
        Tensor::zeros(&[8, 32], DType::F32),
    );
    assert!(matches!(
        build_decoder(&config, &mut weights),
        Err(Error::ShapeMismatch { .. })
    ));
}

#[test]
fn test_synthetic_is_seeded() {
    let config = ModelConfig::tiny();
    let a = synthetic_weights(&config, 3).unwrap();
    let b = synthetic_weights(&config, 3).unwrap();
    let c = synthetic_weights(&config, 4).unwrap();
    let key = "layers.0.mlp.gate_proj.weight";
    assert_eq!(a[key], b[key]);
    assert_ne!(a[key], c[key]);
}

#[test]
fn test_causal_lm_forward_shape() {
    let config = ModelConfig::tiny();
    let mut model = CausalLm::synthetic(config.clone(), 0).unwrap();
    let tokens = Tensor::from_tokens(&[1, 5, 9, 2, 3, 4], 2, 3).unwrap();
    let logits = model.forward(&tokens, &GemmDispatcher::cpu()).unwrap();
    assert_eq!(logits.shape(), &[2, 3, config.vocab_size]);
    assert!(logits.data().iter().all(|v| v.is_finite()));
}

#[test]
fn test_causal_lm_tied_head() {
    let mut config = ModelConfig::tiny();
    config.tie_word_embeddings = true;
    let model = CausalLm::synthetic(config, 0).unwrap();
    assert!(model.is_tied());
    match model.decoder().get_submodule("embed_tokens").unwrap() {
        Module::Embedding(e) => assert_eq!(e.weight(), model.lm_head().weight()),
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn test_causal_lm_missing_head() {
    let config = ModelConfig::tiny();
    let mut weights = synthetic_weights(&config, 0).unwrap();
    weights.remove("lm_head.weight");
    assert!(matches!(
        CausalLm::from_weights(config, weights),
        Err(Error::MissingTensor { .. })
    ));
}

#[test]
fn test_causal_lm_rejects_flat_tokens() {
    let mut model = CausalLm::synthetic(ModelConfig::tiny(), 0).unwrap();
    let tokens = Tensor::from_vec(vec![1.0, 2.0], &[2], DType::I64).unwrap();
    assert!(model.forward(&tokens, &GemmDispatcher::cpu()).is_err());
}

#[test]
fn test_from_pretrained_round_trip() {
    let dir = TempDir::new().unwrap();
    let config = ModelConfig::tiny();
    let weights = synthetic_weights(&config, 11).unwrap();
    save_checkpoint(dir.path(), &config, &weights).unwrap();

    let files = find_safetensors_files(dir.path()).unwrap();
    assert_eq!(files.len(), 1);

    let loaded = load_safetensors(dir.path()).unwrap();
    assert!(loaded.contains_key("model.embed_tokens.weight"));
    assert!(loaded.contains_key("lm_head.weight"));

    let mut from_disk = CausalLm::from_pretrained(dir.path()).unwrap();
    let mut in_memory = CausalLm::from_weights(config, weights).unwrap();
    let tokens = Tensor::from_tokens(&[3, 1, 4, 1], 1, 4).unwrap();
    let gemm = GemmDispatcher::cpu();
    assert_eq!(
        from_disk.forward(&tokens, &gemm).unwrap(),
        in_memory.forward(&tokens, &gemm).unwrap()
    );
}

#[test]
fn test_load_safetensors_empty_dir() {
    let dir = TempDir::new().unwrap();
    assert!(matches!(load_safetensors(dir.path()), Err(Error::ConfigError(_))));
}

#[test]
fn test_tensor_bytes_preserve_dtype() {
    let t = Tensor::from_vec(vec![1.5, -2.0, 0.25], &[3], DType::BF16).unwrap();
    let (dtype, bytes) = tensor_to_bytes(&t);
    assert_eq!(dtype, safetensors::Dtype::BF16);
    assert_eq!(bytes.len(), 6);

    let view = safetensors::tensor::TensorView::new(dtype, vec![3], &bytes).unwrap();
    let back = tensor_from_view(&view).unwrap();
    assert_eq!(back, t);

    let serialized = safetensors::serialize(vec![("t", view)], None).unwrap();
    let parsed = SafeTensors::deserialize(&serialized).unwrap();
    assert_eq!(parsed.tensor("t").unwrap().dtype(), safetensors::Dtype::BF16);
}
