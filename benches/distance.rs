use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use ocelotdb::knn::Distance;

fn vectors(dim: usize) -> (Vec<f32>, Vec<f32>) {
    let a: Vec<f32> = (0..dim).map(|i| (i as f32 * 0.37).sin()).collect();
    let b: Vec<f32> = (0..dim).map(|i| (i as f32 * 0.73).cos()).collect();
    (a, b)
}

fn bench_distances(c: &mut Criterion) {
    let mut group = c.benchmark_group("distance");
    for dim in [16usize, 128, 1024] {
        let (a, b) = vectors(dim);
        for metric in [
            Distance::L1,
            Distance::L2,
            Distance::L2Squared,
            Distance::ChiSquared,
            Distance::Cosine,
            Distance::Hamming,
        ] {
            group.bench_with_input(
                BenchmarkId::new(metric.metric_name(), dim),
                &dim,
                |bencher, _| {
                    bencher.iter(|| metric.between_f32(black_box(&a), black_box(&b)));
                },
            );
        }
    }
    group.finish();
}

criterion_group!(benches, bench_distances);
criterion_main!(benches);
