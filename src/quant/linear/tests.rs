use super::*;
use crate::error::Error;
use crate::gemm::GemmDispatcher;
use crate::nn::Linear;
use crate::quant::per_tensor_quantize;
use crate::tensor::ops::relative_error;
use crate::tensor::{DType, Tensor};
use approx::assert_abs_diff_eq;
use proptest::prelude::*;
use std::sync::Arc;

fn sample_linear() -> Linear {
    let w = Tensor::from_vec(
        vec![0.2, -0.4, 0.1, 0.3, 0.5, -0.1, -0.3, 0.2],
        &[2, 4],
        DType::F32,
    )
    .unwrap();
    let b = Tensor::from_vec(vec![0.05, -0.05], &[2], DType::F32).unwrap();
    Linear::new(w, Some(b)).unwrap()
}

fn activation(scale: f32) -> Tensor {
    Tensor::from_vec(vec![1.0, -2.0, 0.5, 3.0], &[1, 4], DType::F32)
        .unwrap()
        .map(|v| v * scale)
}

#[test]
fn test_dynamic_matches_linear_within_fp8_error() {
    let linear = sample_linear();
    let dynamic = DynamicQuantLinear::from_linear(&linear);
    let gemm = GemmDispatcher::cpu();

    let x = activation(1.0);
    let expected = linear.forward(&x).unwrap();
    let got = dynamic.forward(&x, &gemm).unwrap();
    assert!(relative_error(&got, &expected).unwrap() < 0.1);
}

#[test]
fn test_dynamic_carries_bias_and_weight_scale() {
    let linear = sample_linear();
    let dynamic = DynamicQuantLinear::from_linear(&linear);
    assert_eq!(dynamic.bias(), linear.bias());
    assert_abs_diff_eq!(dynamic.weight_scale(), 0.5 / 448.0, epsilon = 1e-9);
}

#[test]
fn test_observer_first_observation_initializes() {
    let dynamic = DynamicQuantLinear::from_linear(&sample_linear());
    let mut observer = CalibratingObserver::from_dynamic(&dynamic);
    assert_eq!(observer.observed_scale(), None);

    observer.observe(0.0001);
    assert_eq!(observer.observed_scale(), Some(0.0001));
    assert_eq!(observer.num_observations(), 1);
}

#[test]
fn test_observer_scales_half_then_point_three_freeze_at_half() {
    let dynamic = DynamicQuantLinear::from_linear(&sample_linear());
    let mut observer = CalibratingObserver::from_dynamic(&dynamic);
    observer.observe(0.5);
    observer.observe(0.3);

    let frozen = StaticQuantLinear::try_from_observer("mlp.up_proj", &observer).unwrap();
    assert_eq!(frozen.act_scale(), 0.5);
}

#[test]
fn test_observer_forward_records_activation_scale() {
    let dynamic = DynamicQuantLinear::from_linear(&sample_linear());
    let mut observer = CalibratingObserver::from_dynamic(&dynamic);
    let gemm = GemmDispatcher::cpu();

    let small = activation(0.5);
    let large = activation(2.0);
    let out_observer = observer.forward(&small, &gemm).unwrap();
    let out_dynamic = dynamic.forward(&small, &gemm).unwrap();
    assert_eq!(out_observer, out_dynamic);

    observer.forward(&large, &gemm).unwrap();
    observer.forward(&small, &gemm).unwrap();

    let (_, large_scale) = per_tensor_quantize(&large);
    assert_eq!(observer.observed_scale(), Some(large_scale));
    assert_eq!(observer.num_observations(), 3);
}

#[test]
fn test_observer_shares_weight_with_dynamic() {
    let dynamic = DynamicQuantLinear::from_linear(&sample_linear());
    let observer = CalibratingObserver::from_dynamic(&dynamic);
    assert!(Arc::ptr_eq(dynamic.weight(), observer.weight()));
}

#[test]
fn test_freeze_without_observation_fails() {
    let dynamic = DynamicQuantLinear::from_linear(&sample_linear());
    let observer = CalibratingObserver::from_dynamic(&dynamic);
    let err = StaticQuantLinear::try_from_observer("layers.0.mlp.down_proj", &observer).unwrap_err();
    assert!(matches!(err, Error::UncalibratedScale { ref layer } if layer == "layers.0.mlp.down_proj"));
}

#[test]
fn test_static_forward_uses_frozen_scale() {
    let linear = sample_linear();
    let dynamic = DynamicQuantLinear::from_linear(&linear);
    let mut observer = CalibratingObserver::from_dynamic(&dynamic);
    let gemm = GemmDispatcher::cpu();

    let x = activation(1.0);
    observer.forward(&x, &gemm).unwrap();
    let frozen = StaticQuantLinear::try_from_observer("proj", &observer).unwrap();

    // Same input as calibration: static and dynamic quantization coincide.
    let got = frozen.forward(&x, &gemm).unwrap();
    let expected = dynamic.forward(&x, &gemm).unwrap();
    for (a, b) in got.to_vec().iter().zip(expected.to_vec().iter()) {
        assert_abs_diff_eq!(a, b, epsilon = 1e-2);
    }

    // Inputs beyond the calibrated range saturate instead of failing.
    let big = activation(10.0);
    assert!(frozen.forward(&big, &gemm).unwrap().to_vec().iter().all(|v| v.is_finite()));
}

#[test]
fn test_static_rejects_invalid_scale() {
    let dynamic = DynamicQuantLinear::from_linear(&sample_linear());
    let err = StaticQuantLinear::new(Arc::clone(dynamic.weight()), None, 0.0).unwrap_err();
    assert!(matches!(err, Error::InvalidScale { .. }));
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_observed_scale_is_running_max(scales in prop::collection::vec(1e-6f32..10.0, 1..32)) {
        let dynamic = DynamicQuantLinear::from_linear(&sample_linear());
        let mut observer = CalibratingObserver::from_dynamic(&dynamic);
        let mut previous = 0.0f32;
        for &s in &scales {
            observer.observe(s);
            let current = observer.observed_scale().unwrap();
            prop_assert!(current >= previous);
            previous = current;
        }
        let expected = scales.iter().copied().fold(f32::MIN, f32::max);
        prop_assert_eq!(observer.observed_scale(), Some(expected));
    }
}
