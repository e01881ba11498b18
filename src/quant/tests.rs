//! Tests for FP8 quantization

use super::fp8::{decode_slice, E4M3_MIN_NORMAL, E4M3_NAN, E4M3_SUBNORMAL_STEP};
use super::*;
use crate::error::Error;
use crate::tensor::{DType, Tensor};
use approx::assert_abs_diff_eq;
use proptest::prelude::*;

// =============================================================================
// E4M3 codec
// =============================================================================

#[test]
fn test_e4m3_known_encodings() {
    assert_eq!(f32_to_e4m3(0.0), 0x00);
    assert_eq!(f32_to_e4m3(-0.0), 0x80);
    assert_eq!(f32_to_e4m3(1.0), 0x38);
    assert_eq!(f32_to_e4m3(-2.0), 0xC0);
    assert_eq!(f32_to_e4m3(448.0), 0x7E);
    assert_eq!(f32_to_e4m3(E4M3_MIN_NORMAL), 0x08);
    assert_eq!(f32_to_e4m3(E4M3_SUBNORMAL_STEP), 0x01);
}

#[test]
fn test_e4m3_decode_grid_roundtrips_exactly() {
    for bits in 0u8..=255 {
        let value = e4m3_to_f32(bits);
        if value.is_nan() {
            assert_eq!(bits & 0x7F, 0x7F, "only S.1111.111 decodes to NaN, got {bits:#04x}");
            continue;
        }
        assert_eq!(
            f32_to_e4m3(value),
            bits,
            "grid value {value} did not re-encode to {bits:#04x}"
        );
    }
}

#[test]
fn test_e4m3_saturates() {
    assert_eq!(f32_to_e4m3(1000.0), 0x7E);
    assert_eq!(f32_to_e4m3(-1e9), 0xFE);
    assert_eq!(f32_to_e4m3(f32::INFINITY), 0x7E);
    // 464 is the midpoint between 448 and the NaN slot; it must not become NaN
    assert_eq!(f32_to_e4m3(464.0), 0x7E);
}

#[test]
fn test_e4m3_nan() {
    assert_eq!(f32_to_e4m3(f32::NAN), E4M3_NAN);
    assert!(e4m3_to_f32(0x7F).is_nan());
    assert!(e4m3_to_f32(0xFF).is_nan());
}

#[test]
fn test_e4m3_round_ties_to_even() {
    // Between 1.0 (mantissa 0) and 1.125 (mantissa 1): tie goes to the even mantissa.
    assert_eq!(e4m3_to_f32(f32_to_e4m3(1.0625)), 1.0);
    // Between 1.125 (mantissa 1) and 1.25 (mantissa 2): tie goes to 1.25.
    assert_eq!(e4m3_to_f32(f32_to_e4m3(1.1875)), 1.25);
    // Subnormal tie: 0.5 steps rounds to 0, 1.5 steps rounds to 2
    assert_eq!(f32_to_e4m3(0.5 * E4M3_SUBNORMAL_STEP), 0x00);
    assert_eq!(f32_to_e4m3(1.5 * E4M3_SUBNORMAL_STEP), 0x02);
}

#[test]
fn test_e4m3_max_constants() {
    assert_eq!(E4M3_MAX, 448.0);
    assert_eq!(E4M3_MIN, -448.0);
    assert_eq!(e4m3_to_f32(0x7E), E4M3_MAX);
    assert_eq!(e4m3_to_f32(0xFE), E4M3_MIN);
}

// =============================================================================
// Per-tensor quantization
// =============================================================================

#[test]
fn test_constant_two_saturates_to_max() {
    let t = Tensor::full(&[4, 4], 2.0, DType::F32);
    let (q, scale) = per_tensor_quantize(&t);

    assert_eq!(scale, 1.0 / 224.0);
    assert_eq!(q.scale, scale);
    assert!(q.values().iter().all(|&v| v == 448.0));
    assert!(q.data.iter().all(|&b| b == 0x7E));
}

#[test]
fn test_all_zero_tensor_has_positive_scale() {
    let t = Tensor::zeros(&[3, 5], DType::BF16);
    let (q, scale) = per_tensor_quantize(&t);

    assert!(scale > 0.0 && scale.is_finite());
    assert_abs_diff_eq!(scale, MIN_AMAX / 448.0, epsilon = 1e-20);
    assert!(q.values().iter().all(|&v| v == 0.0));
    assert!(q.dequantize().unwrap().to_vec().iter().all(|&v| v == 0.0));
}

#[test]
fn test_quantize_preserves_shape_and_dtype() {
    let t = Tensor::from_vec(vec![0.5, -1.0, 0.25, 2.0, -3.0, 1.5], &[2, 3], DType::F16).unwrap();
    let (q, _) = per_tensor_quantize(&t);
    assert_eq!(q.shape(), &[2, 3]);
    assert_eq!(q.orig_dtype, DType::F16);

    let deq = q.dequantize().unwrap();
    assert_eq!(deq.dtype(), DType::F16);
    assert_eq!(deq.shape(), &[2, 3]);
}

#[test]
fn test_amax_element_maps_to_448() {
    let t = Tensor::from_vec(vec![0.1, -7.0, 3.0], &[3], DType::F32).unwrap();
    let (q, scale) = per_tensor_quantize(&t);
    assert_eq!(q.values()[1], -448.0);
    assert_abs_diff_eq!(scale, 7.0 / 448.0, epsilon = 1e-9);
}

#[test]
fn test_nan_input_encodes_nan() {
    let t = Tensor::from_vec(vec![1.0, f32::NAN, -1.0], &[3], DType::F32).unwrap();
    let (q, scale) = per_tensor_quantize(&t);
    assert!(scale > 0.0);
    assert_eq!(q.data[1], 0x7F);
    assert_eq!(q.values()[0], 448.0);
}

#[test]
fn test_memory_bytes() {
    let t = Tensor::full(&[16, 8], 1.0, DType::BF16);
    let (q, _) = per_tensor_quantize(&t);
    assert_eq!(q.memory_bytes(), 128 + 4);
    assert_eq!(t.storage_bytes(), 256);
}

#[test]
fn test_quantize_with_scale_clamps() {
    let t = Tensor::from_vec(vec![1.0, 100.0, -100.0], &[3], DType::F32).unwrap();
    let q = quantize_with_scale(&t, 0.125).unwrap();
    assert_eq!(decode_slice(&q.data), vec![8.0, 448.0, -448.0]);
    assert_eq!(q.scale, 0.125);
}

#[test]
fn test_quantize_with_scale_rejects_bad_scale() {
    let t = Tensor::full(&[2], 1.0, DType::F32);
    for bad in [0.0, -1.0, f32::NAN, f32::INFINITY] {
        assert!(
            matches!(quantize_with_scale(&t, bad), Err(Error::InvalidScale { .. })),
            "scale {bad} should be rejected"
        );
    }
}

#[test]
fn test_quantize_with_scale_matches_dynamic_at_same_scale() {
    let t = Tensor::from_vec(vec![0.3, -1.2, 0.9, 2.4], &[2, 2], DType::F32).unwrap();
    let (dynamic, scale) = per_tensor_quantize(&t);
    let fixed = quantize_with_scale(&t, scale).unwrap();
    let dynamic_values = dynamic.values();
    for (a, b) in dynamic_values.iter().zip(fixed.values().iter()) {
        // dividing by the scale and multiplying by its reciprocal can differ by one ulp
        assert_abs_diff_eq!(*a, *b, epsilon = 0.125 * a.abs().max(1.0));
    }
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(200))]

    #[test]
    fn prop_scale_strictly_positive(values in prop::collection::vec(-1e4f32..1e4, 1..64)) {
        let n = values.len();
        let t = Tensor::from_vec(values, &[n], DType::F32).unwrap();
        let (_, scale) = per_tensor_quantize(&t);
        prop_assert!(scale > 0.0);
        prop_assert!(scale.is_finite());
    }

    #[test]
    fn prop_codes_within_range(values in prop::collection::vec(-1e4f32..1e4, 1..64)) {
        let n = values.len();
        let t = Tensor::from_vec(values, &[n], DType::F32).unwrap();
        let (q, _) = per_tensor_quantize(&t);
        for v in q.values() {
            prop_assert!((E4M3_MIN..=E4M3_MAX).contains(&v));
        }
    }

    #[test]
    fn prop_roundtrip_error_bounded(values in prop::collection::vec(-100.0f32..100.0, 1..64)) {
        let n = values.len();
        let t = Tensor::from_vec(values.clone(), &[n], DType::F32).unwrap();
        let (q, scale) = per_tensor_quantize(&t);
        let deq = q.dequantize().unwrap().to_vec();
        for (orig, back) in values.iter().zip(deq.iter()) {
            // Half a relative step of the 3-bit mantissa plus half a subnormal step.
            let bound = orig.abs() / 16.0 + E4M3_SUBNORMAL_STEP * scale + 1e-6;
            prop_assert!(
                (orig - back).abs() <= bound,
                "orig {} back {} bound {}", orig, back, bound
            );
        }
    }
}
