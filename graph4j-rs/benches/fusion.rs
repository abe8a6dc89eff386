use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use uuid::Uuid;

use graph4j_rs::search::fusion::merge_ranked;
use graph4j_rs::utils::cosine_similarity;

fn ranked(n: u128, offset: u128) -> Vec<Uuid> {
    (0..n).map(|i| Uuid::from_u128(i * 7 % n + offset)).collect()
}

fn merge_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("merge_ranked");
    for n in [10_u128, 100, 1000] {
        // Half of each list overlaps with the other.
        let fast = ranked(n, 0);
        let quality = ranked(n, n / 2);
        group.bench_with_input(BenchmarkId::from_parameter(n), &n, |b, _| {
            b.iter(|| {
                merge_ranked(
                    black_box(fast.clone()),
                    black_box(quality.clone()),
                    |u| *u,
                    10,
                )
            })
        });
    }
    group.finish();
}

fn cosine_benchmarks(c: &mut Criterion) {
    let a: Vec<f32> = (0..1536).map(|i| (i as f32).sin()).collect();
    let b: Vec<f32> = (0..1536).map(|i| (i as f32).cos()).collect();
    c.bench_function("cosine_similarity_1536", |bench| {
        bench.iter(|| cosine_similarity(black_box(&a), black_box(&b)))
    });
}

criterion_group!(benches, merge_benchmarks, cosine_benchmarks);
criterion_main!(benches);
