//! Criterion benchmarks for FFT convolution evaluation.
//!
//! Every evaluation rebuilds the grid, so these measure the full per-call cost for both
//! interpolation schemes and a two-dimensional case.

use cf_pdf::{Data, FftConvPdf, Pdf, ProductPdf, Space, SumPdf, WrapDistribution};
use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use std::hint::black_box;
use std::sync::Arc;

fn obs() -> Space {
    Space::new("obs1", (-5.0, 5.0)).unwrap()
}

fn func_1d() -> Arc<dyn Pdf> {
    let wide: Arc<dyn Pdf> = Arc::new(WrapDistribution::uniform(-3.0, 0.3, obs()).unwrap());
    let narrow: Arc<dyn Pdf> = Arc::new(WrapDistribution::uniform(-1.2, -1.0, obs()).unwrap());
    Arc::new(SumPdf::new(vec![wide, narrow], vec![0.5.into()]).unwrap())
}

fn bench_conv_1d(c: &mut Criterion) {
    let xs: Vec<f64> = (0..2432).map(|i| -5.0 + 10.0 * i as f64 / 2431.0).collect();
    let x = Data::from_values(obs(), xs).unwrap();

    let mut group = c.benchmark_group("fftconv_1d_pdf");
    for interpolation in ["linear", "spline"] {
        for n in [100usize, 300] {
            let kernel: Arc<dyn Pdf> = Arc::new(WrapDistribution::gauss(0.0, 0.3, obs()).unwrap());
            let conv = FftConvPdf::builder(func_1d(), kernel)
                .n(n)
                .interpolation(interpolation)
                .build()
                .unwrap();
            group.bench_with_input(BenchmarkId::new(interpolation, n), &n, |b, _| {
                b.iter(|| black_box(conv.pdf(black_box(&x), None).unwrap()))
            });
        }
    }
    group.finish();
}

fn bench_conv_2d(c: &mut Criterion) {
    let obs2 = Space::new("obs2", (-6.0, 8.0)).unwrap();
    let g1: Arc<dyn Pdf> = Arc::new(WrapDistribution::gauss(0.0, 0.4, obs()).unwrap());
    let g2: Arc<dyn Pdf> = Arc::new(WrapDistribution::gauss(0.3, 1.1, obs2.clone()).unwrap());
    let g3: Arc<dyn Pdf> = Arc::new(WrapDistribution::gauss(0.5, 0.4, obs2.clone()).unwrap());
    let func: Arc<dyn Pdf> = Arc::new(ProductPdf::new(vec![func_1d(), g3]).unwrap());
    let kernel: Arc<dyn Pdf> = Arc::new(ProductPdf::new(vec![g1, g2]).unwrap());
    let conv = FftConvPdf::builder(func, kernel).build().unwrap();

    let rows: Vec<Vec<f64>> = (0..200)
        .map(|i| {
            let t = i as f64 / 199.0;
            vec![-5.0 + 10.0 * t, -6.0 + 12.0 * t]
        })
        .collect();
    let x = Data::from_rows(conv.space().clone(), &rows).unwrap();
    c.bench_function("fftconv_2d_pdf_default_grid", |b| {
        b.iter(|| black_box(conv.pdf(black_box(&x), None).unwrap()))
    });
}

criterion_group!(benches, bench_conv_1d, bench_conv_2d);
criterion_main!(benches);
