//! Block codec trait
//!
//! Encodes the structure of a blocked format as compile-time constants plus a
//! pair of per-block kernels. The row drivers below are generic over the
//! trait and monomorphized per format.
//!
//! ## Key Algebra
//!
//! Every quantized layout here decodes as `x_i = d * s_j * q_i - dmin * m_j`
//! for some choice of super-block scale `d`, sub-block scale `s_j`, and
//! (optionally) min `m_j`. Simple formats have one sub-block per block.

use crate::catalog::GgmlType;

/// Encode/decode kernels for one block of a storage format
///
/// # Contract
///
/// `ELEMENTS_PER_BLOCK` and `BYTES_PER_BLOCK` must equal
/// `TYPE.geometry()`. `encode_block` receives exactly `ELEMENTS_PER_BLOCK`
/// values and a zeroed `BYTES_PER_BLOCK` slice; `decode_block` the reverse.
pub trait BlockCodec {
    /// Catalog entry this codec produces
    const TYPE: GgmlType;

    /// Values per block
    const ELEMENTS_PER_BLOCK: usize;

    /// Packed bytes per block
    const BYTES_PER_BLOCK: usize;

    /// Quantize one block into `dst`
    fn encode_block(src: &[f32], dst: &mut [u8]);

    /// Reconstruct one block into `dst`
    fn decode_block(src: &[u8], dst: &mut [f32]);
}

/// Encode whole blocks; `src` and `dst` must hold the same block count
pub(crate) fn encode_blocks<C: BlockCodec>(src: &[f32], dst: &mut [u8]) {
    debug_assert_eq!(
        src.len() / C::ELEMENTS_PER_BLOCK,
        dst.len() / C::BYTES_PER_BLOCK
    );
    for (values, block) in src
        .chunks_exact(C::ELEMENTS_PER_BLOCK)
        .zip(dst.chunks_exact_mut(C::BYTES_PER_BLOCK))
    {
        C::encode_block(values, block);
    }
}

/// Decode whole blocks; `src` and `dst` must hold the same block count
pub(crate) fn decode_blocks<C: BlockCodec>(src: &[u8], dst: &mut [f32]) {
    debug_assert_eq!(
        src.len() / C::BYTES_PER_BLOCK,
        dst.len() / C::ELEMENTS_PER_BLOCK
    );
    for (block, values) in src
        .chunks_exact(C::BYTES_PER_BLOCK)
        .zip(dst.chunks_exact_mut(C::ELEMENTS_PER_BLOCK))
    {
        C::decode_block(block, values);
    }
}
