//! Unquantized float layouts (one element per block)

use super::format_trait::BlockCodec;
use super::packing::{read_f16, write_f16};
use crate::catalog::GgmlType;

/// 32-bit IEEE float, little-endian
pub struct F32;

impl BlockCodec for F32 {
    const TYPE: GgmlType = GgmlType::F32;
    const ELEMENTS_PER_BLOCK: usize = 1;
    const BYTES_PER_BLOCK: usize = 4;

    #[inline]
    fn encode_block(src: &[f32], dst: &mut [u8]) {
        dst[..4].copy_from_slice(&src[0].to_le_bytes());
    }

    #[inline]
    fn decode_block(src: &[u8], dst: &mut [f32]) {
        dst[0] = f32::from_le_bytes([src[0], src[1], src[2], src[3]]);
    }
}

/// 16-bit IEEE float, little-endian, round-to-nearest-even on encode
pub struct F16;

impl BlockCodec for F16 {
    const TYPE: GgmlType = GgmlType::F16;
    const ELEMENTS_PER_BLOCK: usize = 1;
    const BYTES_PER_BLOCK: usize = 2;

    #[inline]
    fn encode_block(src: &[f32], dst: &mut [u8]) {
        write_f16(dst, src[0]);
    }

    #[inline]
    fn decode_block(src: &[u8], dst: &mut [f32]) {
        dst[0] = read_f16(src);
    }
}
