//! Property-based tests for decoding, projection and normalization.
//!
//! Run with: cargo test -p attnscope-core --test proptest_invariants

use proptest::prelude::*;

use attnscope_core::{
    decode_f16_le, half_bits_to_f32, normalize_and_map, project, AggMode, Direction,
    HeadSelection, LayerTensor, Normalizer, Palette, TensorShape,
};

/// Strategy for small tensors with values in [0, 1].
fn tensor_strategy() -> impl Strategy<Value = LayerTensor> {
    (1usize..5, 1usize..9).prop_flat_map(|(heads, seq)| {
        prop::collection::vec(0.0f32..1.0, heads * seq * seq).prop_map(move |values| {
            LayerTensor::new(0, TensorShape::new(heads, seq), values).unwrap()
        })
    })
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        max_shrink_iters: 100,
        ..ProptestConfig::default()
    })]

    /// Property: decoding is elementwise, so order of the input pairs does not matter.
    #[test]
    fn prop_decode_is_elementwise(bits in prop::collection::vec(any::<u16>(), 0..64)) {
        let bytes: Vec<u8> = bits.iter().flat_map(|b| b.to_le_bytes()).collect();
        let decoded = decode_f16_le(&bytes).unwrap();

        prop_assert_eq!(decoded.len(), bits.len());
        for (v, b) in decoded.iter().zip(&bits) {
            let expected = half_bits_to_f32(*b);
            prop_assert!(v.to_bits() == expected.to_bits() || (v.is_nan() && expected.is_nan()));
        }
    }

    /// Property: every projection has length seq_len.
    #[test]
    fn prop_projection_length(tensor in tensor_strategy(), pick in 0usize..64, max in any::<bool>()) {
        let selected = pick % tensor.seq_len();
        let agg = if max { AggMode::Max } else { AggMode::Mean };
        for direction in [Direction::Source, Direction::Target] {
            let v = project(&tensor, selected, direction, HeadSelection::Aggregated, agg).unwrap();
            prop_assert_eq!(v.len(), tensor.seq_len());
        }
    }

    /// Property: aggregated max dominates every single head, mean stays within min..max of heads.
    #[test]
    fn prop_aggregation_bounds(tensor in tensor_strategy(), pick in 0usize..64) {
        let selected = pick % tensor.seq_len();
        let max = project(&tensor, selected, Direction::Source, HeadSelection::Aggregated, AggMode::Max).unwrap();
        let mean = project(&tensor, selected, Direction::Source, HeadSelection::Aggregated, AggMode::Mean).unwrap();

        for h in 0..tensor.num_heads() {
            let single = project(&tensor, selected, Direction::Source, HeadSelection::Single(h), AggMode::Mean).unwrap();
            for j in 0..single.len() {
                prop_assert!(max[j] >= single[j]);
            }
        }
        for j in 0..mean.len() {
            prop_assert!(mean[j] <= max[j] + 1e-6);
        }
    }

    /// Property: min maps to bucket 0 and max to bucket 255 whenever the vector has spread.
    #[test]
    fn prop_normalization_endpoints(values in prop::collection::vec(-10.0f32..10.0, 2..128)) {
        let n = Normalizer::fit(&values);
        if !n.is_degenerate() {
            prop_assert_eq!(n.bucket(n.min()), 0);
            prop_assert_eq!(n.bucket(n.max()), 255);
        }
        let rgba = normalize_and_map(&values, Palette::Turbo.lut(), 0.5);
        prop_assert_eq!(rgba.len(), values.len() * 4);
    }
}
