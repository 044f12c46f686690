//! Encode and decode tensor payloads for every selectable catalog type
//!
//! Implements the block layouts used by GGML weight files:
//! - `F32`, `F16`: one element per block
//! - `Q4_0`, `Q4_1`, `Q5_0`, `Q5_1`, `Q8_0`: 32-element blocks, one f16
//!   scale (and an f16 min for the `_1` variants)
//! - `Q2_K` .. `Q6_K`: 256-element super-blocks with packed sub-block scales
//!
//! ## Contract
//!
//! [`encode_into`] takes row-major floats plus the row extent and writes
//! `rows * row_byte_size` bytes. Rows must be a whole number of blocks, so a
//! block never straddles two rows. [`decode_into`] reverses it for any whole
//! number of blocks.
//!
//! Storage-only catalog types (`Q8_1`, `Q8_K`, integer tensors, `BF16`) have
//! no codec here; records of those types can only be copied verbatim.

use crate::catalog::GgmlType;
use crate::error::{CuantizarError, Result};

pub mod float;
pub mod format_trait;
pub mod k_quants;
pub mod packing;
pub mod simple;

pub use format_trait::BlockCodec;

use format_trait::{decode_blocks, encode_blocks};

fn no_codec(ty: GgmlType) -> CuantizarError {
    CuantizarError::argument(ty.name(), "storage-only type has no encoder or decoder")
}

/// Whether `ty` has an encoder and decoder
#[cfg(test)]
pub(crate) fn has_codec(ty: GgmlType) -> bool {
    ty.is_selectable()
}

/// Encode `src` (rows of `row_len` floats) into `dst`, replacing its contents
///
/// # Errors
///
/// `InvalidShape` when `row_len` is zero, not a multiple of the block size,
/// or does not divide `src.len()`; `ArgumentError` for storage-only types.
pub fn encode_into(ty: GgmlType, src: &[f32], row_len: usize, dst: &mut Vec<u8>) -> Result<()> {
    let (elements_per_block, bytes_per_block) = ty.geometry();

    if row_len == 0 && !src.is_empty() {
        return Err(CuantizarError::InvalidShape {
            reason: format!("{ty}: zero row length for {} values", src.len()),
        });
    }
    if row_len % elements_per_block != 0 {
        return Err(CuantizarError::InvalidShape {
            reason: format!(
                "{ty}: row length {row_len} is not a multiple of block size {elements_per_block}"
            ),
        });
    }
    if row_len > 0 && src.len() % row_len != 0 {
        return Err(CuantizarError::InvalidShape {
            reason: format!(
                "{ty}: {} values do not form whole rows of {row_len}",
                src.len()
            ),
        });
    }

    let blocks = src.len() / elements_per_block;
    dst.clear();
    dst.resize(blocks * bytes_per_block, 0);

    match ty {
        GgmlType::F32 => encode_blocks::<float::F32>(src, dst),
        GgmlType::F16 => encode_blocks::<float::F16>(src, dst),
        GgmlType::Q4_0 => encode_blocks::<simple::Q4_0>(src, dst),
        GgmlType::Q4_1 => encode_blocks::<simple::Q4_1>(src, dst),
        GgmlType::Q5_0 => encode_blocks::<simple::Q5_0>(src, dst),
        GgmlType::Q5_1 => encode_blocks::<simple::Q5_1>(src, dst),
        GgmlType::Q8_0 => encode_blocks::<simple::Q8_0>(src, dst),
        GgmlType::Q2_K => encode_blocks::<k_quants::Q2_K>(src, dst),
        GgmlType::Q3_K => encode_blocks::<k_quants::Q3_K>(src, dst),
        GgmlType::Q4_K => encode_blocks::<k_quants::Q4_K>(src, dst),
        GgmlType::Q5_K => encode_blocks::<k_quants::Q5_K>(src, dst),
        GgmlType::Q6_K => encode_blocks::<k_quants::Q6_K>(src, dst),
        other => return Err(no_codec(other)),
    }
    Ok(())
}

/// Decode whole blocks of `src` into `dst`, replacing its contents
///
/// # Errors
///
/// `InvalidShape` when `src` is not a whole number of blocks;
/// `ArgumentError` for storage-only types.
pub fn decode_into(ty: GgmlType, src: &[u8], dst: &mut Vec<f32>) -> Result<()> {
    let (elements_per_block, bytes_per_block) = ty.geometry();

    if src.len() % bytes_per_block != 0 {
        return Err(CuantizarError::InvalidShape {
            reason: format!(
                "{ty} data length {} is not a multiple of block size {bytes_per_block}",
                src.len()
            ),
        });
    }

    let blocks = src.len() / bytes_per_block;
    dst.clear();
    dst.resize(blocks * elements_per_block, 0.0);

    match ty {
        GgmlType::F32 => decode_blocks::<float::F32>(src, dst),
        GgmlType::F16 => decode_blocks::<float::F16>(src, dst),
        GgmlType::Q4_0 => decode_blocks::<simple::Q4_0>(src, dst),
        GgmlType::Q4_1 => decode_blocks::<simple::Q4_1>(src, dst),
        GgmlType::Q5_0 => decode_blocks::<simple::Q5_0>(src, dst),
        GgmlType::Q5_1 => decode_blocks::<simple::Q5_1>(src, dst),
        GgmlType::Q8_0 => decode_blocks::<simple::Q8_0>(src, dst),
        GgmlType::Q2_K => decode_blocks::<k_quants::Q2_K>(src, dst),
        GgmlType::Q3_K => decode_blocks::<k_quants::Q3_K>(src, dst),
        GgmlType::Q4_K => decode_blocks::<k_quants::Q4_K>(src, dst),
        GgmlType::Q5_K => decode_blocks::<k_quants::Q5_K>(src, dst),
        GgmlType::Q6_K => decode_blocks::<k_quants::Q6_K>(src, dst),
        other => return Err(no_codec(other)),
    }
    Ok(())
}

/// Allocating form of [`encode_into`]
///
/// # Errors
///
/// See [`encode_into`].
pub fn encode(ty: GgmlType, src: &[f32], row_len: usize) -> Result<Vec<u8>> {
    let mut out = Vec::new();
    encode_into(ty, src, row_len, &mut out)?;
    Ok(out)
}

/// Allocating form of [`decode_into`]
///
/// # Errors
///
/// See [`decode_into`].
pub fn decode(ty: GgmlType, src: &[u8]) -> Result<Vec<f32>> {
    let mut out = Vec::new();
    decode_into(ty, src, &mut out)?;
    Ok(out)
}
