//! Interpolation of values tabulated on a regular grid.
//!
//! Two schemes are available: multilinear and tensor-product B-splines of order 1 to 9. Queries
//! outside the grid are clamped to the boundary.

use crate::grid::strides;
use cf_core::{Error, Result};
use nalgebra::{Cholesky, DMatrix};
use std::fmt;
use std::str::FromStr;

/// Highest supported B-spline order.
pub const MAX_SPLINE_ORDER: usize = 9;

/// Interpolation scheme of a tabulated density.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Interpolation {
    /// Multilinear.
    Linear,
    /// Tensor-product B-spline of the given order.
    Spline {
        /// Polynomial degree of each piece.
        order: usize,
    },
}

impl Interpolation {
    /// Cubic spline.
    pub const CUBIC: Interpolation = Interpolation::Spline { order: 3 };

    /// Spline order, `None` for linear interpolation.
    pub fn spline_order(&self) -> Option<usize> {
        match self {
            Interpolation::Linear => None,
            Interpolation::Spline { order } => Some(*order),
        }
    }
}

impl Default for Interpolation {
    fn default() -> Self {
        Self::CUBIC
    }
}

impl FromStr for Interpolation {
    type Err = Error;

    /// Parse `linear`, `spline` (cubic) or `spline:<k>`.
    fn from_str(s: &str) -> Result<Self> {
        let bad = || {
            Error::Configuration(format!(
                "invalid interpolation '{s}', expected 'linear', 'spline' or 'spline:<k>' with \
                 1 <= k <= {MAX_SPLINE_ORDER}"
            ))
        };
        match s.trim() {
            "linear" => Ok(Interpolation::Linear),
            "spline" => Ok(Interpolation::CUBIC),
            other => {
                let k = other.strip_prefix("spline:").ok_or_else(bad)?;
                let order: usize = k.trim().parse().map_err(|_| bad())?;
                if !(1..=MAX_SPLINE_ORDER).contains(&order) {
                    return Err(bad());
                }
                Ok(Interpolation::Spline { order })
            }
        }
    }
}

impl fmt::Display for Interpolation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Interpolation::Linear => write!(f, "linear"),
            Interpolation::Spline { order } => write!(f, "spline:{order}"),
        }
    }
}

/// Centered cardinal B-spline of order `k`, evaluated at `x`.
pub(crate) fn bspline(k: usize, x: f64) -> f64 {
    let half = (k + 1) as f64 / 2.0;
    if x.abs() >= half {
        return 0.0;
    }
    // Truncated power form: Σ (-1)^i C(k+1, i) (x + half - i)_+^k / k!
    let mut sum = 0.0;
    let mut binom = 1.0;
    for i in 0..=k + 1 {
        let t = x + half - i as f64;
        if t > 0.0 {
            let term = binom * t.powi(k as i32);
            sum += if i % 2 == 0 { term } else { -term };
        }
        binom = binom * (k + 1 - i) as f64 / (i + 1) as f64;
    }
    let factorial: f64 = (1..=k).map(|v| v as f64).product();
    sum / factorial
}

/// Regular grid `origin[a] + i * step[a]`, `i < shape[a]`, with one value per node (row-major).
#[derive(Debug, Clone)]
pub(crate) struct GridTable {
    origin: Vec<f64>,
    step: Vec<f64>,
    shape: Vec<usize>,
    strides: Vec<usize>,
    values: Vec<f64>,
    coefs: Vec<f64>,
    scheme: Interpolation,
}

impl GridTable {
    pub(crate) fn new(
        origin: Vec<f64>,
        step: Vec<f64>,
        shape: Vec<usize>,
        values: Vec<f64>,
        scheme: Interpolation,
    ) -> Result<Self> {
        let total: usize = shape.iter().product();
        if origin.len() != shape.len() || step.len() != shape.len() || values.len() != total {
            return Err(Error::Computation(format!(
                "grid table shape mismatch: {} values for shape {shape:?}",
                values.len()
            )));
        }
        if shape.iter().any(|&m| m < 2) {
            return Err(Error::Computation(format!(
                "grid table needs two nodes per axis, got {shape:?}"
            )));
        }
        let strides = strides(&shape);
        let coefs = match scheme {
            Interpolation::Linear => values.clone(),
            Interpolation::Spline { order } => {
                let mut c = values.clone();
                for axis in 0..shape.len() {
                    prefilter_axis(&mut c, &shape, &strides, axis, order)?;
                }
                c
            }
        };
        Ok(Self { origin, step, shape, strides, values, coefs, scheme })
    }

    /// Largest tabulated value.
    pub(crate) fn max_value(&self) -> f64 {
        self.values.iter().copied().fold(f64::NEG_INFINITY, f64::max)
    }

    /// Interpolated value at `point` (one coordinate per axis).
    pub(crate) fn eval(&self, point: &[f64]) -> f64 {
        let weights: Vec<Vec<(usize, f64)>> =
            (0..self.shape.len()).map(|a| self.axis_weights(a, point[a])).collect();

        // Odometer over the per-axis supports.
        let mut pos = vec![0usize; weights.len()];
        let mut total = 0.0;
        loop {
            let mut flat = 0;
            let mut w = 1.0;
            for (a, &p) in pos.iter().enumerate() {
                let (i, wa) = weights[a][p];
                flat += i * self.strides[a];
                w *= wa;
            }
            total += w * self.coefs[flat];

            let mut a = weights.len();
            loop {
                if a == 0 {
                    return total;
                }
                a -= 1;
                pos[a] += 1;
                if pos[a] < weights[a].len() {
                    break;
                }
                pos[a] = 0;
            }
        }
    }

    fn axis_weights(&self, axis: usize, x: f64) -> Vec<(usize, f64)> {
        let m = self.shape[axis];
        let last = (m - 1) as f64;
        let t = ((x - self.origin[axis]) / self.step[axis]).clamp(0.0, last);
        match self.scheme {
            Interpolation::Linear => {
                let i0 = (t.floor() as usize).min(m - 2);
                let f = t - i0 as f64;
                vec![(i0, 1.0 - f), (i0 + 1, f)]
            }
            Interpolation::Spline { order } => {
                let half = (order + 1) as f64 / 2.0;
                let lo = (t - half).ceil().max(0.0) as usize;
                let hi = ((t + half).floor() as usize).min(m - 1);
                (lo..=hi)
                    .map(|j| (j, bspline(order, t - j as f64)))
                    .filter(|(_, w)| *w != 0.0)
                    .collect()
            }
        }
    }
}

/// Replace the values along every line of `axis` by B-spline coefficients that interpolate them.
fn prefilter_axis(
    data: &mut [f64],
    shape: &[usize],
    strides: &[usize],
    axis: usize,
    order: usize,
) -> Result<()> {
    let m = shape[axis];
    let stride = strides[axis];
    let lines = data.len() / m;

    let taps: Vec<f64> = (0..m).map(|d| bspline(order, d as f64)).collect();
    let system = DMatrix::from_fn(m, m, |i, j| taps[i.abs_diff(j)]);
    let chol = Cholesky::new(system).ok_or_else(|| {
        Error::Computation(format!("B-spline system of order {order} with {m} nodes is singular"))
    })?;

    // Line starts: every flat index whose coordinate along `axis` is zero.
    let starts: Vec<usize> =
        (0..data.len()).filter(|&flat| (flat / stride) % m == 0).collect();
    debug_assert_eq!(starts.len(), lines);

    let mut rhs = DMatrix::from_fn(m, lines, |i, l| data[starts[l] + i * stride]);
    chol.solve_mut(&mut rhs);
    for (l, &start) in starts.iter().enumerate() {
        for i in 0..m {
            data[start + i * stride] = rhs[(i, l)];
        }
    }
    Ok(())
}
