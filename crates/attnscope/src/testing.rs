//! Shared fixtures for unit tests.

use attnscope_core::{encode_f16_le, layer_file_name, DatasetMeta, TensorShape, META_FILE_NAME};
use std::path::Path;

/// `<bos>`, a 2x2 image block, then `cat`: 4 layers of 2 heads.
pub const SMALL_META_JSON: &str = r#"{
    "model": "Qwen/Qwen3-VL-2B-Thinking",
    "mode": "prefill",
    "prompt": "Describe this image.",
    "image_path": "image.jpg",
    "image_size": [64, 64],
    "num_layers": 4,
    "num_heads": 2,
    "seq_len": 6,
    "dtype": "float16",
    "tokens": [
        {"id": 0, "text": "<|im_start|>", "type": "special"},
        {"id": 1, "text": "<|image_pad|>", "type": "image", "grid_pos": [0, 0]},
        {"id": 2, "text": "<|image_pad|>", "type": "image", "grid_pos": [0, 1]},
        {"id": 3, "text": "<|image_pad|>", "type": "image", "grid_pos": [1, 0]},
        {"id": 4, "text": "<|image_pad|>", "type": "image", "grid_pos": [1, 1]},
        {"id": 5, "text": "cat", "type": "text"}
    ],
    "image_grid": {"rows": 2, "cols": 2, "start_idx": 1, "end_idx": 4}
}"#;

pub fn small_meta() -> DatasetMeta {
    DatasetMeta::from_slice(SMALL_META_JSON.as_bytes()).unwrap()
}

/// Deterministic layer contents, exact in half precision: element `i` of
/// layer `l` is `100 * l + i`.
pub fn layer_values(layer: usize, shape: TensorShape) -> Vec<f32> {
    (0..shape.element_count())
        .map(|i| (100 * layer + i) as f32)
        .collect()
}

/// Write `meta.json` and every layer file of [`small_meta`] into `dir`.
pub fn write_small_dataset(dir: &Path) {
    let meta = small_meta();
    std::fs::write(dir.join(META_FILE_NAME), SMALL_META_JSON).unwrap();
    for layer in 0..meta.num_layers {
        let bytes = encode_f16_le(&layer_values(layer, meta.shape()));
        std::fs::write(dir.join(layer_file_name(layer)), bytes).unwrap();
    }
}
