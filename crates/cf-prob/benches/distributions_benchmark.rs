use cf_prob::{ContinuousDistribution, Normal, NormalMixture, TruncatedNormal};
use criterion::{Criterion, criterion_group, criterion_main};
use std::hint::black_box;

fn bench_scalar_distributions(c: &mut Criterion) {
    let xs: Vec<f64> = (0..10_000).map(|i| (i as f64) * 0.001 - 5.0).collect();

    let normal = Normal::new(0.0, 1.3).unwrap();
    c.bench_function("normal_logpdf_10k", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for &x in &xs {
                acc += normal.log_density(x);
            }
            black_box(acc)
        })
    });

    let truncated = TruncatedNormal::new(0.0, 1.3, -2.0, 3.0).unwrap();
    c.bench_function("truncated_normal_cdf_10k", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for &x in &xs {
                acc += truncated.cumulative(x);
            }
            black_box(acc)
        })
    });

    let n = 500;
    let mixture = NormalMixture::new(
        (0..n).map(|i| i as f64 / n as f64).collect(),
        vec![0.1; n],
        vec![1.0; n],
    )
    .unwrap();
    c.bench_function("mixture_500_density_1k", |b| {
        b.iter(|| {
            let mut acc = 0.0;
            for &x in &xs[..1000] {
                acc += mixture.density(x);
            }
            black_box(acc)
        })
    });
}

criterion_group!(benches, bench_scalar_distributions);
criterion_main!(benches);
