//! FP8 E4M3FN codec
//!
//! Layout `S.EEEE.MMM`, exponent bias 7, no infinities. `S.1111.111` is NaN,
//! so the largest finite magnitude is `0x7E` = 448.

/// Largest finite E4M3FN value.
pub const E4M3_MAX: f32 = 448.0;

/// Smallest (most negative) finite E4M3FN value.
pub const E4M3_MIN: f32 = -448.0;

/// Canonical NaN encoding.
pub const E4M3_NAN: u8 = 0x7F;

/// Smallest positive normal value, 2^-6.
pub const E4M3_MIN_NORMAL: f32 = 0.015_625;

/// Spacing of the subnormal grid, 2^-9.
pub const E4M3_SUBNORMAL_STEP: f32 = 0.001_953_125;

const EXPONENT_BIAS: i32 = 7;
const MAX_FINITE_BITS: u8 = 0x7E;

/// Encode an `f32` as E4M3FN, rounding to nearest with ties to even.
///
/// Out-of-range magnitudes (including infinities) saturate to ±448.
pub fn f32_to_e4m3(value: f32) -> u8 {
    if value.is_nan() {
        return E4M3_NAN;
    }
    let sign: u8 = if value.is_sign_negative() { 0x80 } else { 0x00 };
    let abs = value.abs();

    if abs >= E4M3_MAX {
        return sign | MAX_FINITE_BITS;
    }

    if abs < E4M3_MIN_NORMAL {
        // Subnormals are integer multiples of 2^-9. A result of 8 is exactly
        // the smallest normal, whose bit pattern is also 0x08.
        let steps = (abs / E4M3_SUBNORMAL_STEP).round_ties_even() as u8;
        return sign | steps;
    }

    let bits = abs.to_bits();
    let exponent = ((bits >> 23) & 0xFF) as i32 - 127;
    let fraction = bits & 0x007F_FFFF;

    // Keep the top 3 of 23 fraction bits.
    let mut mantissa = fraction >> 20;
    let remainder = fraction & 0x000F_FFFF;
    let halfway = 0x0008_0000;
    if remainder > halfway || (remainder == halfway && mantissa & 1 == 1) {
        mantissa += 1;
    }

    let mut biased = exponent + EXPONENT_BIAS;
    if mantissa == 8 {
        mantissa = 0;
        biased += 1;
    }

    if biased > 15 || (biased == 15 && mantissa == 7) {
        return sign | MAX_FINITE_BITS;
    }

    sign | ((biased as u8) << 3) | mantissa as u8
}

/// Decode an E4M3FN byte to `f32`.
pub fn e4m3_to_f32(bits: u8) -> f32 {
    let exponent = (bits >> 3) & 0x0F;
    let mantissa = bits & 0x07;
    if exponent == 0x0F && mantissa == 0x07 {
        return f32::NAN;
    }

    let magnitude = if exponent == 0 {
        f32::from(mantissa) * E4M3_SUBNORMAL_STEP
    } else {
        (1.0 + f32::from(mantissa) / 8.0) * 2f32.powi(i32::from(exponent) - EXPONENT_BIAS)
    };

    if bits & 0x80 != 0 {
        -magnitude
    } else {
        magnitude
    }
}

/// Encode a slice of values.
pub fn encode_slice(values: &[f32]) -> Vec<u8> {
    values.iter().map(|&v| f32_to_e4m3(v)).collect()
}

/// Decode a slice of E4M3 bytes.
pub fn decode_slice(codes: &[u8]) -> Vec<f32> {
    codes.iter().map(|&b| e4m3_to_f32(b)).collect()
}
