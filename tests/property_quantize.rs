//! Property-based tests for block encode/decode
//!
//! These tests use proptest to check size contracts and per-block error
//! bounds for every selectable encoding.

use cuantizar::quantize::{decode, encode};
use cuantizar::{GgmlType, TypeCatalog};
use proptest::prelude::*;

/// Largest |x - decode(encode(x))| allowed, as a fraction of the block's max |x|
fn relative_bound(ty: GgmlType) -> f32 {
    match ty {
        GgmlType::F32 => 0.0,
        GgmlType::F16 => 0.001,
        GgmlType::Q4_0 => 0.135,
        GgmlType::Q4_1 => 0.075,
        GgmlType::Q5_0 => 0.07,
        GgmlType::Q5_1 => 0.04,
        GgmlType::Q8_0 => 0.006,
        GgmlType::Q2_K => 0.45,
        GgmlType::Q3_K => 0.30,
        GgmlType::Q4_K => 0.10,
        GgmlType::Q5_K => 0.05,
        GgmlType::Q6_K => 0.05,
        other => panic!("no codec for {other}"),
    }
}

fn selectable() -> Vec<GgmlType> {
    TypeCatalog::new().selectable().map(|d| d.ty).collect()
}

/// Values for `blocks` whole blocks of `ty`, spread over a random magnitude
fn block_values(ty: GgmlType, blocks: usize) -> impl Strategy<Value = Vec<f32>> {
    let n = ty.geometry().0.max(32) * blocks;
    (0.01f32..100.0, prop::collection::vec(-1.0f32..1.0, n))
        .prop_map(|(scale, unit)| unit.into_iter().map(|u| u * scale).collect())
}

fn check_bound(ty: GgmlType, original: &[f32], decoded: &[f32]) -> Result<(), TestCaseError> {
    prop_assert_eq!(original.len(), decoded.len());
    let block = ty.geometry().0.max(32);
    for (a, b) in original.chunks(block).zip(decoded.chunks(block)) {
        let amax = a.iter().fold(0.0f32, |m, v| m.max(v.abs()));
        let limit = relative_bound(ty) * amax + 1e-4 * amax.max(1.0);
        for (x, y) in a.iter().zip(b) {
            prop_assert!((x - y).abs() <= limit, "{}: {} vs {} (limit {})", ty, x, y, limit);
        }
    }
    Ok(())
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Encoded size is rows * row_byte_size for every codec
    #[test]
    fn test_encoded_size(rows in 1usize..4, blocks_per_row in 1usize..3) {
        for ty in selectable() {
            let (epb, bpb) = ty.geometry();
            let row = epb.max(32) * blocks_per_row;
            let values = vec![0.25f32; row * rows];
            let bytes = encode(ty, &values, row).expect("encode");
            prop_assert_eq!(bytes.len(), rows * (row / epb) * bpb);
            prop_assert_eq!(decode(ty, &bytes).expect("decode").len(), row * rows);
        }
    }

    #[test]
    fn test_q4_0_bound(values in block_values(GgmlType::Q4_0, 4)) {
        let decoded = decode(GgmlType::Q4_0, &encode(GgmlType::Q4_0, &values, values.len()).expect("encode")).expect("decode");
        check_bound(GgmlType::Q4_0, &values, &decoded)?;
    }

    #[test]
    fn test_q4_1_bound(values in block_values(GgmlType::Q4_1, 4)) {
        let decoded = decode(GgmlType::Q4_1, &encode(GgmlType::Q4_1, &values, values.len()).expect("encode")).expect("decode");
        check_bound(GgmlType::Q4_1, &values, &decoded)?;
    }

    #[test]
    fn test_q5_0_bound(values in block_values(GgmlType::Q5_0, 4)) {
        let decoded = decode(GgmlType::Q5_0, &encode(GgmlType::Q5_0, &values, values.len()).expect("encode")).expect("decode");
        check_bound(GgmlType::Q5_0, &values, &decoded)?;
    }

    #[test]
    fn test_q5_1_bound(values in block_values(GgmlType::Q5_1, 4)) {
        let decoded = decode(GgmlType::Q5_1, &encode(GgmlType::Q5_1, &values, values.len()).expect("encode")).expect("decode");
        check_bound(GgmlType::Q5_1, &values, &decoded)?;
    }

    #[test]
    fn test_q8_0_bound(values in block_values(GgmlType::Q8_0, 4)) {
        let decoded = decode(GgmlType::Q8_0, &encode(GgmlType::Q8_0, &values, values.len()).expect("encode")).expect("decode");
        check_bound(GgmlType::Q8_0, &values, &decoded)?;
    }

    #[test]
    fn test_k_quant_bounds(values in block_values(GgmlType::Q4_K, 1)) {
        for ty in [GgmlType::Q2_K, GgmlType::Q3_K, GgmlType::Q4_K, GgmlType::Q5_K, GgmlType::Q6_K] {
            let decoded = decode(ty, &encode(ty, &values, values.len()).expect("encode")).expect("decode");
            check_bound(ty, &values, &decoded)?;
        }
    }

    /// Zero blocks decode to exact zeros
    #[test]
    fn test_zero_input_is_exact(blocks in 1usize..3) {
        for ty in selectable() {
            let row = ty.geometry().0.max(32) * blocks;
            let zeros = vec![0.0f32; row];
            let decoded = decode(ty, &encode(ty, &zeros, row).expect("encode")).expect("decode");
            prop_assert!(decoded.iter().all(|&v| v == 0.0), "{}", ty);
        }
    }

    /// Rows that are not whole blocks are rejected, never padded
    #[test]
    fn test_unaligned_rows_rejected(extra in 1usize..31) {
        for ty in selectable().into_iter().filter(|t| t.is_quantized()) {
            let row = ty.geometry().0 + extra;
            prop_assert!(encode(ty, &vec![1.0f32; row], row).is_err(), "{}", ty);
        }
    }
}
