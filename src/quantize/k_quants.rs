//! K-quant 256-element super-block formats
//!
//! Layouts match GGML byte for byte:
//!
//! | Format | Fields (in order)                                          | Bytes |
//! |--------|------------------------------------------------------------|-------|
//! | `Q2_K` | `scales[16], qs[64], d: f16, dmin: f16`                    | 84    |
//! | `Q3_K` | `hmask[32], qs[64], scales[12], d: f16`                    | 110   |
//! | `Q4_K` | `d: f16, dmin: f16, scales[12], qs[128]`                   | 144   |
//! | `Q5_K` | `d: f16, dmin: f16, scales[12], qh[32], qs[128]`           | 176   |
//! | `Q6_K` | `ql[128], qh[64], scales: i8[16], d: f16`                  | 210   |
//!
//! Sub-block scales are chosen from each sub-block's range without an
//! iterative search, then quantized against the super-block scale. The
//! element levels are computed from the stored (f16-rounded) scales so
//! decode sees exactly the grid the encoder used.
//!
//! ## Error bounds (fraction of the super-block's max magnitude `A`)
//!
//! `Q2_K` ≤ 0.36·A, `Q3_K` ≤ 0.28·A, `Q4_K` ≤ 0.07·A, `Q5_K` ≤ 0.035·A,
//! `Q6_K` ≤ 0.04·A.

use super::format_trait::BlockCodec;
use super::packing::{
    affine_params, extract_scale_min, nearest_int, pack_scale_min, quantize_affine, read_f16,
    signed_absmax, write_f16,
};
use crate::catalog::GgmlType;

/// Elements per super-block
pub const QK_K: usize = 256;

#[inline]
fn largest(values: &[f32]) -> f32 {
    values.iter().fold(0.0f32, |acc, &v| acc.max(v))
}

/// Value with the largest magnitude, sign preserved
#[inline]
fn largest_signed(values: &[f32]) -> f32 {
    signed_absmax(values)
}

// ============================================================================
// Q2_K
// ============================================================================

/// 2-bit affine, 16 sub-blocks of 16 with 4-bit scale and min
#[allow(non_camel_case_types)]
pub struct Q2_K;

impl BlockCodec for Q2_K {
    const TYPE: GgmlType = GgmlType::Q2_K;
    const ELEMENTS_PER_BLOCK: usize = QK_K;
    const BYTES_PER_BLOCK: usize = 84;

    fn encode_block(src: &[f32], dst: &mut [u8]) {
        let mut scales = [0.0f32; 16];
        let mut mins = [0.0f32; 16];
        for (j, sub) in src.chunks_exact(16).enumerate() {
            (scales[j], mins[j]) = affine_params(sub, 3.0);
        }
        let max_scale = largest(&scales);
        let max_min = largest(&mins);
        let inv_scale = if max_scale > 0.0 { 15.0 / max_scale } else { 0.0 };
        let inv_min = if max_min > 0.0 { 15.0 / max_min } else { 0.0 };

        for j in 0..16 {
            let ls = nearest_int(inv_scale * scales[j]).clamp(0, 15) as u8;
            let lm = nearest_int(inv_min * mins[j]).clamp(0, 15) as u8;
            dst[j] = ls | (lm << 4);
        }
        write_f16(&mut dst[80..82], max_scale / 15.0);
        write_f16(&mut dst[82..84], max_min / 15.0);
        let d = read_f16(&dst[80..82]);
        let dmin = read_f16(&dst[82..84]);

        let mut levels = [0u8; QK_K];
        for (j, sub) in src.chunks_exact(16).enumerate() {
            let step = d * f32::from(dst[j] & 0x0F);
            let offset = dmin * f32::from(dst[j] >> 4);
            quantize_affine(sub, step, offset, 3, &mut levels[16 * j..16 * j + 16]);
        }

        let qs = &mut dst[16..80];
        for half in 0..2 {
            for shift in 0..4 {
                for l in 0..32 {
                    qs[32 * half + l] |= levels[128 * half + 32 * shift + l] << (2 * shift);
                }
            }
        }
    }

    fn decode_block(src: &[u8], dst: &mut [f32]) {
        let scales = &src[0..16];
        let qs = &src[16..80];
        let d = read_f16(&src[80..82]);
        let dmin = read_f16(&src[82..84]);

        for half in 0..2 {
            for shift in 0..4 {
                for l in 0..32 {
                    let idx = 128 * half + 32 * shift + l;
                    let sc = scales[idx / 16];
                    let q = (qs[32 * half + l] >> (2 * shift)) & 3;
                    dst[idx] = d * f32::from(sc & 0x0F) * f32::from(q) - dmin * f32::from(sc >> 4);
                }
            }
        }
    }
}

// ============================================================================
// Q3_K
// ============================================================================

/// Signed 6-bit scale of sub-block `j` from the 12-byte packed array
#[inline]
fn q3k_scale(scales: &[u8], j: usize) -> i32 {
    let low = if j < 8 {
        scales[j] & 0x0F
    } else {
        scales[j - 8] >> 4
    };
    let high = (scales[8 + j % 4] >> (2 * (j / 4))) & 3;
    i32::from(low | (high << 4)) - 32
}

/// 3-bit symmetric, 16 sub-blocks of 16 with signed 6-bit scales
#[allow(non_camel_case_types)]
pub struct Q3_K;

impl BlockCodec for Q3_K {
    const TYPE: GgmlType = GgmlType::Q3_K;
    const ELEMENTS_PER_BLOCK: usize = QK_K;
    const BYTES_PER_BLOCK: usize = 110;

    fn encode_block(src: &[f32], dst: &mut [u8]) {
        let mut sub_scales = [0.0f32; 16];
        for (j, sub) in src.chunks_exact(16).enumerate() {
            sub_scales[j] = largest_signed(sub) / -4.0;
        }
        let max_scale = largest_signed(&sub_scales);

        let mut packed = [0u8; 12];
        let d = if max_scale == 0.0 {
            0.0
        } else {
            let iscale = -32.0 / max_scale;
            for (j, &s) in sub_scales.iter().enumerate() {
                let l = (nearest_int(iscale * s).clamp(-32, 31) + 32) as u8;
                if j < 8 {
                    packed[j] = l & 0x0F;
                } else {
                    packed[j - 8] |= (l & 0x0F) << 4;
                }
                packed[8 + j % 4] |= (l >> 4) << (2 * (j / 4));
            }
            1.0 / iscale
        };
        dst[96..108].copy_from_slice(&packed);
        write_f16(&mut dst[108..110], d);
        let d = read_f16(&dst[108..110]);

        let mut levels = [4u8; QK_K];
        for (j, sub) in src.chunks_exact(16).enumerate() {
            let step = d * q3k_scale(&packed, j) as f32;
            if step == 0.0 {
                continue;
            }
            let inv = 1.0 / step;
            for (level, &x) in levels[16 * j..16 * j + 16].iter_mut().zip(sub) {
                *level = (nearest_int(x * inv).clamp(-4, 3) + 4) as u8;
            }
        }

        let (hmask, rest) = dst.split_at_mut(32);
        for (i, level) in levels.iter_mut().enumerate() {
            if *level > 3 {
                hmask[i % 32] |= 1 << (i / 32);
                *level -= 4;
            }
        }
        let qs = &mut rest[..64];
        for half in 0..2 {
            for shift in 0..4 {
                for l in 0..32 {
                    qs[32 * half + l] |= levels[128 * half + 32 * shift + l] << (2 * shift);
                }
            }
        }
    }

    fn decode_block(src: &[u8], dst: &mut [f32]) {
        let hmask = &src[0..32];
        let qs = &src[32..96];
        let scales = &src[96..108];
        let d = read_f16(&src[108..110]);

        for half in 0..2 {
            for shift in 0..4 {
                let bit = 4 * half + shift;
                for l in 0..32 {
                    let idx = 128 * half + 32 * shift + l;
                    let dl = d * q3k_scale(scales, idx / 16) as f32;
                    let low = i32::from((qs[32 * half + l] >> (2 * shift)) & 3);
                    let high = if (hmask[l] >> bit) & 1 == 1 { 0 } else { 4 };
                    dst[idx] = dl * (low - high) as f32;
                }
            }
        }
    }
}

// ============================================================================
// Q4_K / Q5_K
// ============================================================================

/// Sub-block scales/mins packed to 6 bits; returns `(packed, d, dmin)` pre-rounding
fn pack_affine_scales(src: &[f32], nmax: f32) -> ([u8; 12], f32, f32) {
    let mut scales = [0.0f32; 8];
    let mut mins = [0.0f32; 8];
    for (j, sub) in src.chunks_exact(32).enumerate() {
        (scales[j], mins[j]) = affine_params(sub, nmax);
    }
    let max_scale = largest(&scales);
    let max_min = largest(&mins);
    let inv_scale = if max_scale > 0.0 { 63.0 / max_scale } else { 0.0 };
    let inv_min = if max_min > 0.0 { 63.0 / max_min } else { 0.0 };

    let mut packed = [0u8; 12];
    for j in 0..8 {
        let ls = nearest_int(inv_scale * scales[j]).clamp(0, 63) as u8;
        let lm = nearest_int(inv_min * mins[j]).clamp(0, 63) as u8;
        pack_scale_min(&mut packed, j, ls, lm);
    }
    (packed, max_scale / 63.0, max_min / 63.0)
}

/// Levels for all eight 32-element sub-blocks against the stored scales
fn affine_levels(src: &[f32], packed: &[u8], d: f32, dmin: f32, nmax: i32) -> [u8; QK_K] {
    let mut levels = [0u8; QK_K];
    for (j, sub) in src.chunks_exact(32).enumerate() {
        let (sc, m) = extract_scale_min(packed, j);
        let step = d * f32::from(sc);
        let offset = dmin * f32::from(m);
        quantize_affine(sub, step, offset, nmax, &mut levels[32 * j..32 * j + 32]);
    }
    levels
}

/// 4-bit affine, 8 sub-blocks of 32 with 6-bit scale and min
#[allow(non_camel_case_types)]
pub struct Q4_K;

impl BlockCodec for Q4_K {
    const TYPE: GgmlType = GgmlType::Q4_K;
    const ELEMENTS_PER_BLOCK: usize = QK_K;
    const BYTES_PER_BLOCK: usize = 144;

    fn encode_block(src: &[f32], dst: &mut [u8]) {
        let (packed, d, dmin) = pack_affine_scales(src, 15.0);
        write_f16(&mut dst[0..2], d);
        write_f16(&mut dst[2..4], dmin);
        dst[4..16].copy_from_slice(&packed);
        let d = read_f16(&dst[0..2]);
        let dmin = read_f16(&dst[2..4]);

        let levels = affine_levels(src, &packed, d, dmin, 15);
        let qs = &mut dst[16..144];
        for chunk in 0..4 {
            for l in 0..32 {
                let lo = levels[64 * chunk + l];
                let hi = levels[64 * chunk + 32 + l];
                qs[32 * chunk + l] = lo | (hi << 4);
            }
        }
    }

    fn decode_block(src: &[u8], dst: &mut [f32]) {
        let d = read_f16(&src[0..2]);
        let dmin = read_f16(&src[2..4]);
        let scales = &src[4..16];
        let qs = &src[16..144];

        for chunk in 0..4 {
            let (sc1, m1) = extract_scale_min(scales, 2 * chunk);
            let (sc2, m2) = extract_scale_min(scales, 2 * chunk + 1);
            let (d1, min1) = (d * f32::from(sc1), dmin * f32::from(m1));
            let (d2, min2) = (d * f32::from(sc2), dmin * f32::from(m2));
            for l in 0..32 {
                let q = qs[32 * chunk + l];
                dst[64 * chunk + l] = d1 * f32::from(q & 0x0F) - min1;
                dst[64 * chunk + 32 + l] = d2 * f32::from(q >> 4) - min2;
            }
        }
    }
}

/// 5-bit affine, 8 sub-blocks of 32 with 6-bit scale and min
#[allow(non_camel_case_types)]
pub struct Q5_K;

impl BlockCodec for Q5_K {
    const TYPE: GgmlType = GgmlType::Q5_K;
    const ELEMENTS_PER_BLOCK: usize = QK_K;
    const BYTES_PER_BLOCK: usize = 176;

    fn encode_block(src: &[f32], dst: &mut [u8]) {
        let (packed, d, dmin) = pack_affine_scales(src, 31.0);
        write_f16(&mut dst[0..2], d);
        write_f16(&mut dst[2..4], dmin);
        dst[4..16].copy_from_slice(&packed);
        let d = read_f16(&dst[0..2]);
        let dmin = read_f16(&dst[2..4]);

        let levels = affine_levels(src, &packed, d, dmin, 31);
        let (qh, qs) = dst[16..176].split_at_mut(32);
        for chunk in 0..4 {
            let u1 = 1u8 << (2 * chunk);
            let u2 = 2u8 << (2 * chunk);
            for l in 0..32 {
                let lo = levels[64 * chunk + l];
                let hi = levels[64 * chunk + 32 + l];
                if lo > 15 {
                    qh[l] |= u1;
                }
                if hi > 15 {
                    qh[l] |= u2;
                }
                qs[32 * chunk + l] = (lo & 0x0F) | ((hi & 0x0F) << 4);
            }
        }
    }

    fn decode_block(src: &[u8], dst: &mut [f32]) {
        let d = read_f16(&src[0..2]);
        let dmin = read_f16(&src[2..4]);
        let scales = &src[4..16];
        let qh = &src[16..48];
        let qs = &src[48..176];

        for chunk in 0..4 {
            let (sc1, m1) = extract_scale_min(scales, 2 * chunk);
            let (sc2, m2) = extract_scale_min(scales, 2 * chunk + 1);
            let (d1, min1) = (d * f32::from(sc1), dmin * f32::from(m1));
            let (d2, min2) = (d * f32::from(sc2), dmin * f32::from(m2));
            let u1 = 1u8 << (2 * chunk);
            let u2 = 2u8 << (2 * chunk);
            for l in 0..32 {
                let q = qs[32 * chunk + l];
                let lo = (q & 0x0F) + if qh[l] & u1 != 0 { 16 } else { 0 };
                let hi = (q >> 4) + if qh[l] & u2 != 0 { 16 } else { 0 };
                dst[64 * chunk + l] = d1 * f32::from(lo) - min1;
                dst[64 * chunk + 32 + l] = d2 * f32::from(hi) - min2;
            }
        }
    }
}

// ============================================================================
// Q6_K
// ============================================================================

/// 6-bit symmetric, 16 sub-blocks of 16 with signed 8-bit scales
#[allow(non_camel_case_types)]
pub struct Q6_K;

impl BlockCodec for Q6_K {
    const TYPE: GgmlType = GgmlType::Q6_K;
    const ELEMENTS_PER_BLOCK: usize = QK_K;
    const BYTES_PER_BLOCK: usize = 210;

    fn encode_block(src: &[f32], dst: &mut [u8]) {
        let mut sub_scales = [0.0f32; 16];
        for (j, sub) in src.chunks_exact(16).enumerate() {
            sub_scales[j] = largest_signed(sub) / -32.0;
        }
        let max_scale = largest_signed(&sub_scales);
        if max_scale == 0.0 {
            dst[..210].fill(0);
            return;
        }

        let iscale = -128.0 / max_scale;
        for (j, &s) in sub_scales.iter().enumerate() {
            dst[192 + j] = nearest_int(iscale * s).clamp(-128, 127) as i8 as u8;
        }
        write_f16(&mut dst[208..210], 1.0 / iscale);
        let d = read_f16(&dst[208..210]);

        let mut levels = [32u8; QK_K];
        for (j, sub) in src.chunks_exact(16).enumerate() {
            let step = d * f32::from(dst[192 + j] as i8);
            if step == 0.0 {
                continue;
            }
            let inv = 1.0 / step;
            for (level, &x) in levels[16 * j..16 * j + 16].iter_mut().zip(sub) {
                *level = (nearest_int(x * inv).clamp(-32, 31) + 32) as u8;
            }
        }

        let (ql, rest) = dst.split_at_mut(128);
        let qh = &mut rest[..64];
        for half in 0..2 {
            for l in 0..32 {
                let base = 128 * half;
                let q1 = levels[base + l];
                let q2 = levels[base + 32 + l];
                let q3 = levels[base + 64 + l];
                let q4 = levels[base + 96 + l];
                ql[64 * half + l] = (q1 & 0x0F) | ((q3 & 0x0F) << 4);
                ql[64 * half + 32 + l] = (q2 & 0x0F) | ((q4 & 0x0F) << 4);
                qh[32 * half + l] = (q1 >> 4) | ((q2 >> 4) << 2) | ((q3 >> 4) << 4) | ((q4 >> 4) << 6);
            }
        }
    }

    fn decode_block(src: &[u8], dst: &mut [f32]) {
        let d = read_f16(&src[208..210]);

        for half in 0..2 {
            let ql = &src[64 * half..64 * half + 64];
            let qh = &src[128 + 32 * half..128 + 32 * half + 32];
            let sc = &src[192 + 8 * half..192 + 8 * half + 8];
            let base = 128 * half;
            for l in 0..32 {
                let is = l / 16;
                let q1 = i32::from((ql[l] & 0x0F) | ((qh[l] & 3) << 4)) - 32;
                let q2 = i32::from((ql[l + 32] & 0x0F) | (((qh[l] >> 2) & 3) << 4)) - 32;
                let q3 = i32::from((ql[l] >> 4) | (((qh[l] >> 4) & 3) << 4)) - 32;
                let q4 = i32::from((ql[l + 32] >> 4) | (((qh[l] >> 6) & 3) << 4)) - 32;
                dst[base + l] = d * f32::from(sc[is] as i8) * q1 as f32;
                dst[base + 32 + l] = d * f32::from(sc[is + 2] as i8) * q2 as f32;
                dst[base + 64 + l] = d * f32::from(sc[is + 4] as i8) * q3 as f32;
                dst[base + 96 + l] = d * f32::from(sc[is + 6] as i8) * q4 as f32;
            }
        }
    }
}
