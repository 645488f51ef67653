//! # attnscope core
//!
//! Synchronous building blocks for browsing per-layer attention tensors of a
//! vision-language model.
//!
//! ## Pipeline
//!
//! ```text
//! attn_layer_NN.bin ──> LayerDecoder ──> LayerTensor
//!                                            │
//!          (selected, direction, head, agg)  ↓
//!                                         project ──> Vec<f32> (seq_len)
//!                                                        │
//!                              Palette::lut(), opacity   ↓
//!                                               normalize_and_map ──> RGBA bytes
//! ```
//!
//! - [`LayerDecoder`] promotes little-endian binary16 to `f32`, rejecting
//!   buffers whose length does not match the layer shape.
//! - [`project`] slices or reduces a `[heads, seq, seq]` tensor into one
//!   attention vector.
//! - [`normalize_and_map`] rescales a vector to its own min/max and looks
//!   every element up in a cached 256-entry palette table.
//! - [`DatasetMeta`] describes the token sequence and image grid.

pub mod colormap;
pub mod decode;
pub mod error;
pub mod meta;
pub mod project;
pub mod tensor;

pub use colormap::{build_lut, map_with, normalize_and_map, ColorLut, ColorStop, Normalizer, Palette, LUT_SIZE};
pub use decode::{decode_f16_le, encode_f16_le, half_bits_to_f32, LayerDecoder};
pub use error::{CoreError, Result};
pub use meta::{
    layer_file_name, DatasetMeta, ExtractionMode, ImageGrid, Token, TokenType, META_FILE_NAME,
};
pub use project::{project, AggMode, Direction, HeadSelection};
pub use tensor::{LayerTensor, TensorShape};

/// Prelude for common imports
pub mod prelude {
    pub use super::{
        normalize_and_map, project, AggMode, DatasetMeta, Direction, HeadSelection, LayerDecoder,
        LayerTensor, Palette, Result, TensorShape,
    };
}
