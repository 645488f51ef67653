//! Decoded per-layer attention tensors.

use crate::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Dimensions of one layer's attention tensor: `[num_heads, seq_len, seq_len]`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TensorShape {
    /// Number of attention heads.
    pub num_heads: usize,
    /// Sequence length (rows == cols).
    pub seq_len: usize,
}

impl TensorShape {
    /// Create a new shape.
    pub fn new(num_heads: usize, seq_len: usize) -> Self {
        Self { num_heads, seq_len }
    }

    /// Total element count.
    pub fn element_count(&self) -> usize {
        self.num_heads * self.seq_len * self.seq_len
    }

    /// Exact byte size of the half-precision encoding.
    pub fn byte_len(&self) -> usize {
        self.element_count() * 2
    }
}

/// One layer's full attention weights, flattened row-major.
///
/// `tensor[head, row, col] = data[head * seq_len * seq_len + row * seq_len + col]`.
/// Cloning shares the underlying buffer.
#[derive(Debug, Clone)]
pub struct LayerTensor {
    layer: usize,
    shape: TensorShape,
    data: Arc<[f32]>,
}

impl LayerTensor {
    /// Wrap decoded values, taking ownership of the buffer.
    pub fn new(layer: usize, shape: TensorShape, data: Vec<f32>) -> Result<Self> {
        if data.len() != shape.element_count() {
            return Err(CoreError::corrupt(shape.byte_len(), data.len() * 2));
        }
        Ok(Self {
            layer,
            shape,
            data: data.into(),
        })
    }

    /// Layer index this tensor was loaded from.
    pub fn layer(&self) -> usize {
        self.layer
    }

    /// Tensor dimensions.
    pub fn shape(&self) -> TensorShape {
        self.shape
    }

    pub fn num_heads(&self) -> usize {
        self.shape.num_heads
    }

    pub fn seq_len(&self) -> usize {
        self.shape.seq_len
    }

    /// Flat row-major values.
    pub fn as_slice(&self) -> &[f32] {
        &self.data
    }

    /// Value at `[head, row, col]`. Panics when out of range.
    #[inline]
    pub fn at(&self, head: usize, row: usize, col: usize) -> f32 {
        let n = self.shape.seq_len;
        self.data[head * n * n + row * n + col]
    }

    /// Contiguous row `[head, row, ..]`.
    #[inline]
    pub fn row(&self, head: usize, row: usize) -> &[f32] {
        let n = self.shape.seq_len;
        let start = head * n * n + row * n;
        &self.data[start..start + n]
    }

    /// Size of the decoded buffer in bytes.
    pub fn memory_bytes(&self) -> usize {
        self.data.len() * std::mem::size_of::<f32>()
    }

    /// Whether two handles share the same decoded buffer.
    pub fn shares_buffer(&self, other: &LayerTensor) -> bool {
        Arc::ptr_eq(&self.data, &other.data)
    }
}

impl PartialEq for LayerTensor {
    fn eq(&self, other: &Self) -> bool {
        self.layer == other.layer
            && self.shape == other.shape
            && (self.shares_buffer(other)
                || self
                    .data
                    .iter()
                    .zip(other.data.iter())
                    .all(|(a, b)| a.to_bits() == b.to_bits()))
    }
}
