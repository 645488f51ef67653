//! Benchmarks for the per-selection hot path
//!
//! Measures projection, normalization and decode at sequence lengths typical
//! of single-image prompts.

use attnscope_core::{
    encode_f16_le, normalize_and_map, project, AggMode, Direction, HeadSelection, LayerDecoder,
    LayerTensor, Palette, TensorShape,
};
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};

/// Synthetic layer with softmax-like rows
fn create_test_tensor(num_heads: usize, seq_len: usize) -> LayerTensor {
    let shape = TensorShape::new(num_heads, seq_len);
    let values = (0..shape.element_count())
        .map(|i| ((i * 2654435761usize) % 1000) as f32 / (1000.0 * seq_len as f32))
        .collect();
    LayerTensor::new(0, shape, values).unwrap()
}

fn bench_project(c: &mut Criterion) {
    let mut group = c.benchmark_group("project");

    for seq_len in [128usize, 512, 1024] {
        let tensor = create_test_tensor(16, seq_len);
        let selected = seq_len / 2;

        group.bench_with_input(BenchmarkId::new("single_source", seq_len), &tensor, |b, t| {
            b.iter(|| {
                project(
                    t,
                    black_box(selected),
                    Direction::Source,
                    HeadSelection::Single(3),
                    AggMode::Mean,
                )
            });
        });

        group.bench_with_input(BenchmarkId::new("mean_target", seq_len), &tensor, |b, t| {
            b.iter(|| {
                project(
                    t,
                    black_box(selected),
                    Direction::Target,
                    HeadSelection::Aggregated,
                    AggMode::Mean,
                )
            });
        });
    }

    group.finish();
}

fn bench_normalize(c: &mut Criterion) {
    let mut group = c.benchmark_group("normalize_and_map");
    let lut = Palette::Viridis.lut();

    for len in [128usize, 512, 1024] {
        let values: Vec<f32> = (0..len).map(|i| (i % 97) as f32 / 97.0).collect();
        group.bench_with_input(BenchmarkId::from_parameter(len), &values, |b, v| {
            b.iter(|| normalize_and_map(black_box(v), lut, 0.8));
        });
    }

    group.finish();
}

fn bench_decode(c: &mut Criterion) {
    let mut group = c.benchmark_group("decode");
    group.sample_size(20);

    let shape = TensorShape::new(16, 512);
    let values: Vec<f32> = (0..shape.element_count()).map(|i| (i % 4096) as f32 / 4096.0).collect();
    let bytes = encode_f16_le(&values);

    group.bench_function("serial", |b| {
        let decoder = LayerDecoder::new(usize::MAX);
        b.iter(|| decoder.decode(0, shape, black_box(&bytes)));
    });
    group.bench_function("parallel", |b| {
        let decoder = LayerDecoder::new(1);
        b.iter(|| decoder.decode(0, shape, black_box(&bytes)));
    });

    group.finish();
}

criterion_group!(benches, bench_project, bench_normalize, bench_decode);
criterion_main!(benches);
