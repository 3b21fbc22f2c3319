//! N-dimensional linear convolution through the FFT.

use crate::grid::strides;
use cf_core::{Error, Result};
use rustfft::{FftDirection, FftPlanner, num_complex::Complex};

/// Row-major array with its shape.
#[derive(Debug, Clone, PartialEq)]
pub(crate) struct Tensor {
    pub shape: Vec<usize>,
    pub values: Vec<f64>,
}

impl Tensor {
    pub(crate) fn new(shape: Vec<usize>, values: Vec<f64>) -> Result<Self> {
        if shape.iter().product::<usize>() != values.len() || shape.contains(&0) {
            return Err(Error::Computation(format!(
                "{} values do not fill shape {shape:?}",
                values.len()
            )));
        }
        Ok(Self { shape, values })
    }
}

/// Full linear convolution `(a * b)[k] = Σ_j a[j] b[k - j]`.
///
/// The output has `a.shape[i] + b.shape[i] - 1` entries along axis `i`.
pub(crate) fn convolve_full(a: &Tensor, b: &Tensor) -> Result<Tensor> {
    if a.shape.len() != b.shape.len() {
        return Err(Error::Computation(format!(
            "cannot convolve shapes {:?} and {:?}",
            a.shape, b.shape
        )));
    }
    let shape: Vec<usize> = a.shape.iter().zip(&b.shape).map(|(x, y)| x + y - 1).collect();
    let total: usize = shape.iter().product();
    log::debug!("fft convolution {:?} * {:?} -> {shape:?}", a.shape, b.shape);

    let mut planner = FftPlanner::<f64>::new();
    let mut fa = pad(a, &shape);
    let mut fb = pad(b, &shape);
    transform(&mut planner, &mut fa, &shape, FftDirection::Forward);
    transform(&mut planner, &mut fb, &shape, FftDirection::Forward);
    for (x, y) in fa.iter_mut().zip(&fb) {
        *x *= *y;
    }
    transform(&mut planner, &mut fa, &shape, FftDirection::Inverse);

    // rustfft does not normalize the inverse transform.
    let scale = 1.0 / total as f64;
    Tensor::new(shape, fa.into_iter().map(|c| c.re * scale).collect())
}

fn pad(t: &Tensor, shape: &[usize]) -> Vec<Complex<f64>> {
    let out_strides = strides(shape);
    let in_strides = strides(&t.shape);
    let mut out = vec![Complex::new(0.0, 0.0); shape.iter().product()];
    for (flat, &v) in t.values.iter().enumerate() {
        let target: usize = in_strides
            .iter()
            .zip(&t.shape)
            .zip(&out_strides)
            .map(|((&s, &m), &os)| ((flat / s) % m) * os)
            .sum();
        out[target] = Complex::new(v, 0.0);
    }
    out
}

/// In-place FFT along every axis of a row-major array.
fn transform(
    planner: &mut FftPlanner<f64>,
    data: &mut [Complex<f64>],
    shape: &[usize],
    direction: FftDirection,
) {
    let st = strides(shape);
    for (axis, &len) in shape.iter().enumerate() {
        if len < 2 {
            continue;
        }
        let fft = planner.plan_fft(len, direction);
        let stride = st[axis];
        let mut line = vec![Complex::new(0.0, 0.0); len];
        for start in (0..data.len()).filter(|&flat| (flat / stride) % len == 0) {
            for (i, c) in line.iter_mut().enumerate() {
                *c = data[start + i * stride];
            }
            fft.process(&mut line);
            for (i, c) in line.iter().enumerate() {
                data[start + i * stride] = *c;
            }
        }
    }
}
