//! Dataset metadata (`meta.json`) written next to the layer files.

use crate::{CoreError, Result, TensorShape};
use serde::{Deserialize, Serialize};

/// Metadata file name inside a dataset directory.
pub const META_FILE_NAME: &str = "meta.json";

/// File name of layer `index`: `attn_layer_<index, 2-digit zero-padded>.bin`.
pub fn layer_file_name(index: usize) -> String {
    format!("attn_layer_{:02}.bin", index)
}

/// Token category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenType {
    Text,
    Image,
    Special,
}

/// One token of the prompt sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Token {
    /// Position in the sequence
    pub id: usize,
    /// Decoded text
    pub text: String,
    #[serde(rename = "type")]
    pub kind: TokenType,
    /// `(row, col)` inside the image grid, image tokens only
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub grid_pos: Option<(usize, usize)>,
}

impl Token {
    pub fn is_image(&self) -> bool {
        self.kind == TokenType::Image
    }
}

/// Contiguous block of image tokens laid out row-major on a grid.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct ImageGrid {
    pub rows: usize,
    pub cols: usize,
    pub start_idx: usize,
    pub end_idx: usize,
}

impl ImageGrid {
    /// Grid with no image tokens (all fields zero).
    pub fn is_empty(&self) -> bool {
        self.rows == 0 || self.cols == 0
    }

    pub fn cell_count(&self) -> usize {
        self.rows * self.cols
    }

    /// Inclusive token range covered by the grid.
    pub fn token_range(&self) -> std::ops::RangeInclusive<usize> {
        self.start_idx..=self.end_idx
    }

    /// Row-major cell offset of `(row, col)`.
    pub fn cell_offset(&self, row: usize, col: usize) -> Option<usize> {
        (row < self.rows && col < self.cols).then(|| row * self.cols + col)
    }
}

/// How the sequence was produced by the extraction run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExtractionMode {
    /// Attention over the prompt only
    #[default]
    Prefill,
    /// Attention over prompt plus generated tokens
    Generate,
}

/// Contents of `meta.json`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatasetMeta {
    pub model: String,
    #[serde(default)]
    pub mode: ExtractionMode,
    pub prompt: String,
    pub image_path: String,
    pub image_size: (u32, u32),
    pub num_layers: usize,
    pub num_heads: usize,
    pub seq_len: usize,
    pub dtype: String,
    pub tokens: Vec<Token>,
    #[serde(default)]
    pub image_grid: ImageGrid,
}

impl DatasetMeta {
    /// Parse and validate `meta.json` bytes.
    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        let meta: DatasetMeta = serde_json::from_slice(bytes)?;
        meta.validate()?;
        Ok(meta)
    }

    /// Per-layer tensor shape.
    pub fn shape(&self) -> TensorShape {
        TensorShape::new(self.num_heads, self.seq_len)
    }

    /// Check internal consistency.
    pub fn validate(&self) -> Result<()> {
        if self.num_layers == 0 {
            return Err(CoreError::invalid_metadata("num_layers must be at least 1"));
        }
        if self.num_heads == 0 {
            return Err(CoreError::invalid_metadata("num_heads must be at least 1"));
        }
        if self.dtype != "float16" {
            return Err(CoreError::invalid_metadata(format!(
                "unsupported dtype '{}'",
                self.dtype
            )));
        }
        if self.tokens.len() != self.seq_len {
            return Err(CoreError::invalid_metadata(format!(
                "{} tokens listed for seq_len {}",
                self.tokens.len(),
                self.seq_len
            )));
        }

        let grid = &self.image_grid;
        if !grid.is_empty() && (grid.start_idx > grid.end_idx || grid.end_idx >= self.seq_len) {
            return Err(CoreError::invalid_metadata(format!(
                "image grid range {}..={} invalid for seq_len {}",
                grid.start_idx, grid.end_idx, self.seq_len
            )));
        }

        for (i, token) in self.tokens.iter().enumerate() {
            match (token.kind, token.grid_pos) {
                (TokenType::Image, Some((row, col))) => {
                    if grid.cell_offset(row, col).is_none() {
                        return Err(CoreError::invalid_metadata(format!(
                            "token {i} grid_pos ({row}, {col}) outside {}x{} grid",
                            grid.rows, grid.cols
                        )));
                    }
                }
                (TokenType::Image, None) => {
                    return Err(CoreError::invalid_metadata(format!(
                        "image token {i} has no grid_pos"
                    )));
                }
                (_, Some(_)) => {
                    return Err(CoreError::invalid_metadata(format!(
                        "non-image token {i} has a grid_pos"
                    )));
                }
                (_, None) => {}
            }
        }

        Ok(())
    }

    /// Validate a layer index against `num_layers`.
    pub fn check_layer(&self, layer: usize) -> Result<()> {
        if layer >= self.num_layers {
            return Err(CoreError::precondition(format!(
                "layer {layer} out of range for {} layers",
                self.num_layers
            )));
        }
        Ok(())
    }

    /// Validate a token index against `seq_len`.
    pub fn check_token(&self, token: usize) -> Result<()> {
        if token >= self.seq_len {
            return Err(CoreError::precondition(format!(
                "token {token} out of range for seq_len {}",
                self.seq_len
            )));
        }
        Ok(())
    }

    /// Grid cell of `token`, if it is an image token.
    pub fn cell_of(&self, token: usize) -> Option<(usize, usize)> {
        self.tokens.get(token).and_then(|t| t.grid_pos)
    }

    /// Token sitting at grid cell `(row, col)`.
    pub fn token_at(&self, row: usize, col: usize) -> Option<usize> {
        self.image_grid.cell_offset(row, col)?;
        self.tokens
            .get(self.image_grid.token_range())?
            .iter()
            .find(|t| t.grid_pos == Some((row, col)))
            .map(|t| t.id)
    }

    pub fn image_token_count(&self) -> usize {
        self.tokens.iter().filter(|t| t.is_image()).count()
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;

    /// Six tokens: `<bos>`, a 2x2 image block, and one text token.
    pub fn small_meta() -> DatasetMeta {
        let mut tokens = vec![Token {
            id: 0,
            text: "<|im_start|>".into(),
            kind: TokenType::Special,
            grid_pos: None,
        }];
        for (k, pos) in [(0, 0), (0, 1), (1, 0), (1, 1)].into_iter().enumerate() {
            tokens.push(Token {
                id: k + 1,
                text: "<|image_pad|>".into(),
                kind: TokenType::Image,
                grid_pos: Some(pos),
            });
        }
        tokens.push(Token {
            id: 5,
            text: "cat".into(),
            kind: TokenType::Text,
            grid_pos: None,
        });

        DatasetMeta {
            model: "Qwen/Qwen3-VL-2B-Thinking".into(),
            mode: ExtractionMode::Prefill,
            prompt: "Describe this image.".into(),
            image_path: "image.jpg".into(),
            image_size: (64, 64),
            num_layers: 4,
            num_heads: 2,
            seq_len: 6,
            dtype: "float16".into(),
            tokens,
            image_grid: ImageGrid {
                rows: 2,
                cols: 2,
                start_idx: 1,
                end_idx: 4,
            },
        }
    }
}
