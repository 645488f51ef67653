//! Half-precision layer decoding.
//!
//! Layer files are raw little-endian IEEE-754 binary16 values with no header.
//! Every value is promoted to `f32` exactly: zero and subnormals, normals,
//! infinities and NaN all keep their binary16 meaning.

use crate::{CoreError, LayerTensor, Result, TensorShape};
use half::f16;
use rayon::prelude::*;
use std::time::Instant;
use tracing::debug;

/// Element count above which decoding is split across the rayon pool.
pub const DEFAULT_PARALLEL_MIN_ELEMENTS: usize = 1 << 20;

/// Promote one binary16 bit pattern.
#[inline]
pub fn half_bits_to_f32(bits: u16) -> f32 {
    f16::from_bits(bits).to_f32()
}

/// Decode a little-endian binary16 buffer of any even length.
pub fn decode_f16_le(bytes: &[u8]) -> Result<Vec<f32>> {
    if bytes.len() % 2 != 0 {
        return Err(CoreError::corrupt(bytes.len() + 1, bytes.len()));
    }
    Ok(bytes
        .chunks_exact(2)
        .map(|c| f16::from_le_bytes([c[0], c[1]]).to_f32())
        .collect())
}

/// Decoder turning raw layer bytes into a [`LayerTensor`].
#[derive(Debug, Clone, Copy)]
pub struct LayerDecoder {
    parallel_min_elements: usize,
}

impl Default for LayerDecoder {
    fn default() -> Self {
        Self {
            parallel_min_elements: DEFAULT_PARALLEL_MIN_ELEMENTS,
        }
    }
}

impl LayerDecoder {
    /// Create a decoder with a custom parallelism threshold.
    pub fn new(parallel_min_elements: usize) -> Self {
        Self {
            parallel_min_elements: parallel_min_elements.max(1),
        }
    }

    /// Decode one layer. The byte length must equal `shape.byte_len()` exactly.
    pub fn decode(&self, layer: usize, shape: TensorShape, bytes: &[u8]) -> Result<LayerTensor> {
        let expected = shape.byte_len();
        if bytes.len() != expected {
            return Err(CoreError::corrupt(expected, bytes.len()));
        }

        let start = Instant::now();
        let elements = shape.element_count();
        let values = if elements >= self.parallel_min_elements {
            let mut out = vec![0.0f32; elements];
            out.par_chunks_mut(64 * 1024)
                .zip(bytes.par_chunks(128 * 1024))
                .for_each(|(dst, src)| {
                    for (d, c) in dst.iter_mut().zip(src.chunks_exact(2)) {
                        *d = f16::from_le_bytes([c[0], c[1]]).to_f32();
                    }
                });
            out
        } else {
            decode_f16_le(bytes)?
        };

        debug!(
            layer,
            elements,
            elapsed_us = start.elapsed().as_micros() as u64,
            "decoded layer"
        );

        LayerTensor::new(layer, shape, values)
    }
}

/// Encode values as little-endian binary16 (test fixtures and tooling).
pub fn encode_f16_le(values: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(values.len() * 2);
    for &v in values {
        out.extend_from_slice(&f16::from_f32(v).to_le_bytes());
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Binary16 value computed directly from its fields.
    fn field_value(bits: u16) -> f64 {
        let sign = if bits & 0x8000 != 0 { -1.0 } else { 1.0 };
        let exponent = ((bits >> 10) & 0x1f) as i32;
        let fraction = (bits & 0x3ff) as f64;
        match exponent {
            0 => sign * 2f64.powi(-14) * (fraction / 1024.0),
            31 if fraction == 0.0 => sign * f64::INFINITY,
            31 => f64::NAN,
            e => sign * 2f64.powi(e - 15) * (1.0 + fraction / 1024.0),
        }
    }

    #[test]
    fn test_representative_patterns() {
        assert_eq!(half_bits_to_f32(0x0000).to_bits(), 0.0f32.to_bits());
        assert_eq!(half_bits_to_f32(0x8000).to_bits(), (-0.0f32).to_bits());
        assert_eq!(half_bits_to_f32(0x0001), 2f32.powi(-24));
        assert_eq!(half_bits_to_f32(0x7bff), 65504.0);
        assert_eq!(half_bits_to_f32(0x7c00), f32::INFINITY);
        assert_eq!(half_bits_to_f32(0xfc00), f32::NEG_INFINITY);
        assert!(half_bits_to_f32(0x7e00).is_nan());
        assert!(half_bits_to_f32(0xfc01).is_nan());
        assert_eq!(half_bits_to_f32(0x3c00), 1.0);
    }

    #[test]
    fn test_every_pattern_matches_field_formula() {
        for bits in 0..=u16::MAX {
            let decoded = half_bits_to_f32(bits) as f64;
            let expected = field_value(bits);
            if expected.is_nan() {
                assert!(decoded.is_nan(), "0x{bits:04x}");
            } else {
                assert_eq!(decoded, expected, "0x{bits:04x}");
                assert_eq!(decoded.is_sign_negative(), expected.is_sign_negative());
            }
        }
    }

    #[test]
    fn test_little_endian_order() {
        // 1.0 = 0x3c00, stored low byte first
        let values = decode_f16_le(&[0x00, 0x3c, 0x00, 0xc0]).unwrap();
        assert_eq!(values, vec![1.0, -2.0]);
    }

    #[test]
    fn test_odd_length_rejected() {
        assert!(matches!(
            decode_f16_le(&[0x00, 0x3c, 0x00]),
            Err(CoreError::CorruptLayerData { .. })
        ));
    }

    #[test]
    fn test_layer_length_must_match_shape() {
        let shape = TensorShape::new(2, 3);
        let bytes = vec![0u8; shape.byte_len() - 2];
        let err = LayerDecoder::default().decode(0, shape, &bytes).unwrap_err();
        match err {
            CoreError::CorruptLayerData { expected, actual } => {
                assert_eq!(expected, 36);
                assert_eq!(actual, 34);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_parallel_and_serial_agree() {
        let shape = TensorShape::new(3, 40);
        let values: Vec<f32> = (0..shape.element_count())
            .map(|i| (i % 977) as f32 / 977.0)
            .collect();
        let bytes = encode_f16_le(&values);

        let serial = LayerDecoder::new(usize::MAX).decode(5, shape, &bytes).unwrap();
        let parallel = LayerDecoder::new(1).decode(5, shape, &bytes).unwrap();

        assert_eq!(serial, parallel);
        assert_eq!(parallel.layer(), 5);
    }
}
