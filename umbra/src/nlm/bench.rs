//! Benchmarks for NLM filtering.
//! Run with: cargo bench -p umbra --features bench --bench nlm

use std::hint::black_box;

use common::SimdLevel;
use criterion::{BenchmarkId, Criterion, Throughput};

use super::{filter, simd};
use crate::config::{DispatchConfig, NlmParams};
use crate::rect::Rect;

fn pattern(len: usize, step: usize) -> Vec<f32> {
    (0..len).map(|i| ((i * step) % 100) as f32 * 0.01).collect()
}

pub fn bench_nlm(c: &mut Criterion) {
    let mut group = c.benchmark_group("nlm_filter");
    group.sample_size(10);

    for size in [64, 128] {
        let rect = Rect::from_size(size, size);
        let noisy = pattern(rect.dense_len(), 7);
        let variance = vec![0.05f32; rect.dense_len()];
        let mut output = vec![0.0f32; rect.dense_len()];
        let params = NlmParams::default();
        let dispatch = DispatchConfig::default();

        group.throughput(Throughput::Elements(rect.area() as u64));
        group.bench_function(BenchmarkId::new("size", format!("{size}x{size}")), |b| {
            b.iter(|| {
                filter(
                    black_box(&noisy),
                    black_box(&noisy),
                    black_box(&variance),
                    &mut output,
                    &rect,
                    &params,
                    &dispatch,
                )
                .unwrap();
            });
        });
    }

    group.finish();

    let mut row_group = c.benchmark_group("nlm_row_distance");

    for width in [7, 13, 64] {
        let wp = pattern(width, 3);
        let wq = pattern(width, 11);
        let vp = vec![0.05f32; width];
        let vq = vec![0.07f32; width];

        row_group.throughput(Throughput::Elements(width as u64));
        for level in SimdLevel::available() {
            row_group.bench_function(BenchmarkId::new(level.to_string(), width), |b| {
                b.iter(|| {
                    black_box(simd::row_distance_with(
                        level,
                        black_box(&wp),
                        black_box(&wq),
                        black_box(&vp),
                        black_box(&vq),
                        1.0,
                        0.25,
                    ))
                });
            });
        }
    }

    row_group.finish();
}
