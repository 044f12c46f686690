//! Shared scalar helpers for the block codecs
//!
//! ## Contents
//! - f16 conversion: `read_f16`, `write_f16`
//! - Rounding and range scans: `nearest_int`, `signed_absmax`, `min_max`
//! - K-quant 6-bit scale packing: `extract_scale_min`, `pack_scale_min`

/// Read a little-endian f16 as f32
#[inline]
pub fn read_f16(bytes: &[u8]) -> f32 {
    let bits = u16::from_le_bytes([bytes[0], bytes[1]]);
    half::f16::from_bits(bits).to_f32()
}

/// Write `value` as a little-endian f16 into `dst[..2]`
#[inline]
pub fn write_f16(dst: &mut [u8], value: f32) {
    dst[..2].copy_from_slice(&half::f16::from_f32(value).to_le_bytes());
}

/// Round to nearest, ties away from zero
#[inline]
pub fn nearest_int(value: f32) -> i32 {
    value.round() as i32
}

/// Value with the largest magnitude, sign preserved (first one on ties)
#[inline]
pub fn signed_absmax(values: &[f32]) -> f32 {
    let mut amax = 0.0f32;
    let mut max = 0.0f32;
    for &v in values {
        if v.abs() > amax {
            amax = v.abs();
            max = v;
        }
    }
    max
}

/// `(min, max)` of a non-empty slice
#[inline]
pub fn min_max(values: &[f32]) -> (f32, f32) {
    values
        .iter()
        .fold((f32::INFINITY, f32::NEG_INFINITY), |(lo, hi), &v| {
            (lo.min(v), hi.max(v))
        })
}

/// Scale and negated min for an affine `d * q - m` sub-block with levels `0..=nmax`
///
/// The min is clamped to at most zero so `m` is never negative.
#[inline]
pub fn affine_params(values: &[f32], nmax: f32) -> (f32, f32) {
    let (min, max) = min_max(values);
    let min = min.min(0.0);
    ((max - min) / nmax, -min)
}

/// Quantize `values` to `round((x + offset) / step)` clamped to `0..=nmax`
///
/// A zero step leaves every level at zero.
#[inline]
pub fn quantize_affine(values: &[f32], step: f32, offset: f32, nmax: i32, levels: &mut [u8]) {
    if step == 0.0 {
        levels[..values.len()].fill(0);
        return;
    }
    let inv = 1.0 / step;
    for (level, &x) in levels.iter_mut().zip(values) {
        *level = nearest_int((x + offset) * inv).clamp(0, nmax) as u8;
    }
}

/// Extract the 6-bit scale and min for sub-block `j` of a `Q4_K`/`Q5_K` block
///
/// Blocks 0-3 use the low 6 bits of bytes `j` and `j + 4`; blocks 4-7 combine
/// a nibble of byte `j + 4` with the top 2 bits of bytes `j - 4` and `j`.
#[inline]
pub fn extract_scale_min(scales: &[u8], j: usize) -> (u8, u8) {
    if j < 4 {
        (scales[j] & 63, scales[j + 4] & 63)
    } else {
        let d = (scales[j + 4] & 0x0F) | ((scales[j - 4] >> 6) << 4);
        let m = (scales[j + 4] >> 4) | ((scales[j] >> 6) << 4);
        (d, m)
    }
}

/// Inverse of [`extract_scale_min`]; sub-blocks must be packed in order 0..8
#[inline]
pub fn pack_scale_min(scales: &mut [u8], j: usize, scale: u8, min: u8) {
    if j < 4 {
        scales[j] = scale;
        scales[j + 4] = min;
    } else {
        scales[j + 4] = (scale & 0x0F) | ((min & 0x0F) << 4);
        scales[j - 4] |= (scale >> 4) << 6;
        scales[j] |= (min >> 4) << 6;
    }
}
