use criterion::{criterion_group, criterion_main};

fn nlm_benchmarks(c: &mut criterion::Criterion) {
    umbra::bench::nlm::bench_nlm(c);
}

criterion_group!(benches, nlm_benchmarks);
criterion_main!(benches);
