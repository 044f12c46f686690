//! Simple 32-element block formats
//!
//! | Format | Layout                                    | Bytes |
//! |--------|-------------------------------------------|-------|
//! | `Q4_0` | `d: f16, qs[16]`                          | 18    |
//! | `Q4_1` | `d: f16, m: f16, qs[16]`                  | 20    |
//! | `Q5_0` | `d: f16, qh: u32, qs[16]`                 | 22    |
//! | `Q5_1` | `d: f16, m: f16, qh: u32, qs[16]`         | 24    |
//! | `Q8_0` | `d: f16, qs: i8[32]`                      | 34    |
//!
//! Nibble-packed formats put element `j` in the low nibble of `qs[j]` and
//! element `j + 16` in the high nibble. `qh` bit `j` is the fifth bit of
//! element `j`.
//!
//! ## Error bounds
//!
//! Affine formats (`Q4_1`, `Q5_1`) and `Q8_0` reconstruct within half a step.
//! The symmetric formats (`Q4_0`, `Q5_0`) map the signed extreme to the lowest
//! level, so values at the opposite extreme clamp one level short and are off
//! by at most one full step.

use super::format_trait::BlockCodec;
use super::packing::{min_max, nearest_int, read_f16, signed_absmax, write_f16};
use crate::catalog::GgmlType;

const QK: usize = 32;

#[inline]
fn inverse(d: f32) -> f32 {
    if d == 0.0 {
        0.0
    } else {
        1.0 / d
    }
}

/// 4-bit symmetric: `x = d * (q - 8)`
#[allow(non_camel_case_types)]
pub struct Q4_0;

impl BlockCodec for Q4_0 {
    const TYPE: GgmlType = GgmlType::Q4_0;
    const ELEMENTS_PER_BLOCK: usize = QK;
    const BYTES_PER_BLOCK: usize = 18;

    fn encode_block(src: &[f32], dst: &mut [u8]) {
        let d = signed_absmax(src) / -8.0;
        let id = inverse(d);
        write_f16(&mut dst[0..2], d);

        for j in 0..QK / 2 {
            let q0 = ((src[j] * id + 8.5) as u8).min(15);
            let q1 = ((src[j + QK / 2] * id + 8.5) as u8).min(15);
            dst[2 + j] = q0 | (q1 << 4);
        }
    }

    fn decode_block(src: &[u8], dst: &mut [f32]) {
        let d = read_f16(&src[0..2]);
        for (j, &byte) in src[2..18].iter().enumerate() {
            dst[j] = d * f32::from(i16::from(byte & 0x0F) - 8);
            dst[j + 16] = d * f32::from(i16::from(byte >> 4) - 8);
        }
    }
}

/// 4-bit affine: `x = d * q + m`
#[allow(non_camel_case_types)]
pub struct Q4_1;

impl BlockCodec for Q4_1 {
    const TYPE: GgmlType = GgmlType::Q4_1;
    const ELEMENTS_PER_BLOCK: usize = QK;
    const BYTES_PER_BLOCK: usize = 20;

    fn encode_block(src: &[f32], dst: &mut [u8]) {
        let (min, max) = min_max(src);
        let d = (max - min) / 15.0;
        let id = inverse(d);
        write_f16(&mut dst[0..2], d);
        write_f16(&mut dst[2..4], min);

        for j in 0..QK / 2 {
            let q0 = (((src[j] - min) * id + 0.5) as u8).min(15);
            let q1 = (((src[j + QK / 2] - min) * id + 0.5) as u8).min(15);
            dst[4 + j] = q0 | (q1 << 4);
        }
    }

    fn decode_block(src: &[u8], dst: &mut [f32]) {
        let d = read_f16(&src[0..2]);
        let m = read_f16(&src[2..4]);
        for (j, &byte) in src[4..20].iter().enumerate() {
            dst[j] = d * f32::from(byte & 0x0F) + m;
            dst[j + 16] = d * f32::from(byte >> 4) + m;
        }
    }
}

/// 5-bit symmetric: `x = d * (q - 16)`
#[allow(non_camel_case_types)]
pub struct Q5_0;

impl BlockCodec for Q5_0 {
    const TYPE: GgmlType = GgmlType::Q5_0;
    const ELEMENTS_PER_BLOCK: usize = QK;
    const BYTES_PER_BLOCK: usize = 22;

    fn encode_block(src: &[f32], dst: &mut [u8]) {
        let d = signed_absmax(src) / -16.0;
        let id = inverse(d);
        write_f16(&mut dst[0..2], d);

        let mut qh = 0u32;
        for j in 0..QK / 2 {
            let q0 = ((src[j] * id + 16.5) as u8).min(31);
            let q1 = ((src[j + QK / 2] * id + 16.5) as u8).min(31);
            dst[6 + j] = (q0 & 0x0F) | ((q1 & 0x0F) << 4);
            qh |= u32::from(q0 >> 4) << j;
            qh |= u32::from(q1 >> 4) << (j + QK / 2);
        }
        dst[2..6].copy_from_slice(&qh.to_le_bytes());
    }

    fn decode_block(src: &[u8], dst: &mut [f32]) {
        let d = read_f16(&src[0..2]);
        let qh = u32::from_le_bytes([src[2], src[3], src[4], src[5]]);
        for (j, &byte) in src[6..22].iter().enumerate() {
            let hi0 = ((qh >> j) & 1) as u8;
            let hi1 = ((qh >> (j + 16)) & 1) as u8;
            let q0 = (byte & 0x0F) | (hi0 << 4);
            let q1 = (byte >> 4) | (hi1 << 4);
            dst[j] = d * f32::from(i16::from(q0) - 16);
            dst[j + 16] = d * f32::from(i16::from(q1) - 16);
        }
    }
}

/// 5-bit affine: `x = d * q + m`
#[allow(non_camel_case_types)]
pub struct Q5_1;

impl BlockCodec for Q5_1 {
    const TYPE: GgmlType = GgmlType::Q5_1;
    const ELEMENTS_PER_BLOCK: usize = QK;
    const BYTES_PER_BLOCK: usize = 24;

    fn encode_block(src: &[f32], dst: &mut [u8]) {
        let (min, max) = min_max(src);
        let d = (max - min) / 31.0;
        let id = inverse(d);
        write_f16(&mut dst[0..2], d);
        write_f16(&mut dst[2..4], min);

        let mut qh = 0u32;
        for j in 0..QK / 2 {
            let q0 = (((src[j] - min) * id + 0.5) as u8).min(31);
            let q1 = (((src[j + QK / 2] - min) * id + 0.5) as u8).min(31);
            dst[8 + j] = (q0 & 0x0F) | ((q1 & 0x0F) << 4);
            qh |= u32::from(q0 >> 4) << j;
            qh |= u32::from(q1 >> 4) << (j + QK / 2);
        }
        dst[4..8].copy_from_slice(&qh.to_le_bytes());
    }

    fn decode_block(src: &[u8], dst: &mut [f32]) {
        let d = read_f16(&src[0..2]);
        let m = read_f16(&src[2..4]);
        let qh = u32::from_le_bytes([src[4], src[5], src[6], src[7]]);
        for (j, &byte) in src[8..24].iter().enumerate() {
            let hi0 = ((qh >> j) & 1) as u8;
            let hi1 = ((qh >> (j + 16)) & 1) as u8;
            dst[j] = d * f32::from((byte & 0x0F) | (hi0 << 4)) + m;
            dst[j + 16] = d * f32::from((byte >> 4) | (hi1 << 4)) + m;
        }
    }
}

/// 8-bit symmetric: `x = d * q`
#[allow(non_camel_case_types)]
pub struct Q8_0;

impl BlockCodec for Q8_0 {
    const TYPE: GgmlType = GgmlType::Q8_0;
    const ELEMENTS_PER_BLOCK: usize = QK;
    const BYTES_PER_BLOCK: usize = 34;

    fn encode_block(src: &[f32], dst: &mut [u8]) {
        let amax = src.iter().fold(0.0f32, |acc, v| acc.max(v.abs()));
        let d = amax / 127.0;
        let id = inverse(d);
        write_f16(&mut dst[0..2], d);

        for (q, &x) in dst[2..34].iter_mut().zip(src) {
            *q = nearest_int(x * id).clamp(-127, 127) as i8 as u8;
        }
    }

    fn decode_block(src: &[u8], dst: &mut [f32]) {
        let d = read_f16(&src[0..2]);
        for (out, &byte) in dst.iter_mut().zip(&src[2..34]) {
            *out = d * f32::from(byte as i8);
        }
    }
}
