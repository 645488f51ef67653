//! Image-grid heatmap overlay

use attnscope_core::{map_with, ColorLut, CoreError, DatasetMeta, Normalizer};

/// RGBA heatmap laid over the input image, one pixel per grid cell.
///
/// Image-token values are normalized among themselves, so text tokens with
/// large weights do not wash out the image patches. Cells no token maps to
/// stay fully transparent.
#[derive(Debug, Clone, PartialEq)]
pub struct GridOverlay {
    rows: usize,
    cols: usize,
    rgba: Vec<u8>,
    normalizer: Normalizer,
}

impl GridOverlay {
    /// Build the overlay for one attention vector.
    ///
    /// Returns `Ok(None)` when the dataset has no image grid.
    pub fn build(
        vector: &[f32],
        meta: &DatasetMeta,
        lut: &ColorLut,
        opacity: f32,
    ) -> attnscope_core::Result<Option<Self>> {
        if vector.len() != meta.seq_len {
            return Err(CoreError::precondition(format!(
                "vector length {} does not match seq_len {}",
                vector.len(),
                meta.seq_len
            )));
        }

        let grid = meta.image_grid;
        if grid.is_empty() {
            return Ok(None);
        }

        let mut offsets = Vec::with_capacity(grid.cell_count());
        let mut values = Vec::with_capacity(grid.cell_count());
        for (index, token) in meta.tokens.iter().enumerate() {
            if !token.is_image() {
                continue;
            }
            if let Some(offset) = token.grid_pos.and_then(|(r, c)| grid.cell_offset(r, c)) {
                offsets.push(offset);
                values.push(vector[index]);
            }
        }

        let normalizer = Normalizer::fit(&values);
        let mapped = map_with(&values, &normalizer, lut, opacity);

        let mut rgba = vec![0u8; grid.cell_count() * 4];
        for (offset, color) in offsets.iter().zip(mapped.chunks_exact(4)) {
            rgba[offset * 4..offset * 4 + 4].copy_from_slice(color);
        }

        Ok(Some(Self {
            rows: grid.rows,
            cols: grid.cols,
            rgba,
            normalizer,
        }))
    }

    pub fn rows(&self) -> usize {
        self.rows
    }

    pub fn cols(&self) -> usize {
        self.cols
    }

    /// Row-major RGBA bytes, `rows * cols * 4` long.
    pub fn rgba(&self) -> &[u8] {
        &self.rgba
    }

    /// Color of cell `(row, col)`.
    pub fn pixel(&self, row: usize, col: usize) -> Option<[u8; 4]> {
        if row >= self.rows || col >= self.cols {
            return None;
        }
        let at = (row * self.cols + col) * 4;
        let mut px = [0u8; 4];
        px.copy_from_slice(&self.rgba[at..at + 4]);
        Some(px)
    }

    /// Value range the image tokens were normalized over.
    pub fn value_range(&self) -> (f32, f32) {
        (self.normalizer.min(), self.normalizer.max())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::small_meta;
    use attnscope_core::{ImageGrid, Palette, TokenType};

    #[test]
    fn test_image_tokens_normalized_among_themselves() {
        let meta = small_meta();
        // Text token 5 dominates the vector but is not on the grid.
        let vector = [0.0, 0.1, 0.2, 0.3, 0.5, 9.0];
        let lut = Palette::Grayscale.lut();

        let overlay = GridOverlay::build(&vector, &meta, lut, 1.0).unwrap().unwrap();
        assert_eq!((overlay.rows(), overlay.cols()), (2, 2));
        assert_eq!(overlay.pixel(0, 0), Some([0, 0, 0, 255]));
        assert_eq!(overlay.pixel(1, 1), Some([255, 255, 255, 255]));
        assert_eq!(overlay.pixel(0, 1), Some(lut.get(64)));
        assert_eq!(overlay.value_range(), (0.1, 0.5));
    }

    #[test]
    fn test_uncovered_cells_transparent() {
        let mut meta = small_meta();
        meta.tokens[4].kind = TokenType::Text;
        meta.tokens[4].grid_pos = None;

        let vector = [0.0, 0.1, 0.2, 0.3, 0.4, 0.5];
        let overlay = GridOverlay::build(&vector, &meta, Palette::Viridis.lut(), 0.5)
            .unwrap()
            .unwrap();
        assert_eq!(overlay.pixel(1, 1), Some([0, 0, 0, 0]));
        assert_eq!(overlay.pixel(0, 0).map(|p| p[3]), Some(128));
    }

    #[test]
    fn test_no_grid() {
        let mut meta = small_meta();
        for token in &mut meta.tokens {
            token.kind = TokenType::Text;
            token.grid_pos = None;
        }
        meta.image_grid = ImageGrid::default();

        let vector = [0.0; 6];
        let overlay = GridOverlay::build(&vector, &meta, Palette::Viridis.lut(), 1.0).unwrap();
        assert!(overlay.is_none());
    }

    #[test]
    fn test_length_mismatch() {
        let meta = small_meta();
        let err = GridOverlay::build(&[0.0; 3], &meta, Palette::Viridis.lut(), 1.0).unwrap_err();
        assert!(matches!(err, CoreError::PreconditionViolation(_)));
    }
}
