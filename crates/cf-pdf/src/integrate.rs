//! Numeric integration over rectangular limits.

use crate::data::Data;
use crate::grid::{cartesian, linspace};
use crate::pdf::Pdf;
use cf_core::{Error, IntegrationSettings, Result, Space};

/// Nodes per axis for a `d`-dimensional grid within the configured budget.
pub(crate) fn nodes_per_axis(d: usize, settings: &IntegrationSettings) -> usize {
    let budget = ((settings.max_points as f64).powf(1.0 / d.max(1) as f64) + 1e-9).floor() as usize;
    settings.points_per_axis.min(budget).max(2)
}

/// Tensor-product trapezoid rule of `eval` over `limits` with `nodes[a]` nodes on axis `a`.
pub(crate) fn trapezoid<F>(limits: &Space, nodes: &[usize], eval: F) -> Result<f64>
where
    F: FnOnce(&Data) -> Result<Vec<f64>>,
{
    if !limits.is_finite() {
        return Err(Error::NumericalInstability(format!(
            "cannot integrate numerically over non-finite limits {:?}",
            limits.rect_limits()
        )));
    }
    let mut axes = Vec::with_capacity(limits.n_obs());
    let mut weights = Vec::with_capacity(limits.n_obs());
    for (axis, &n) in limits.axes().iter().zip(nodes) {
        let n = n.max(2);
        let h = axis.width() / (n - 1) as f64;
        let mut w = vec![h; n];
        w[0] = 0.5 * h;
        w[n - 1] = 0.5 * h;
        axes.push(linspace(axis.lower, axis.upper, n));
        weights.push(w);
    }
    let grid = cartesian(limits, &axes)?;
    let values = eval(&grid)?;
    if values.len() != grid.len() {
        return Err(Error::Computation(format!(
            "integrand returned {} values for {} nodes",
            values.len(),
            grid.len()
        )));
    }

    let shape: Vec<usize> = axes.iter().map(Vec::len).collect();
    let st = crate::grid::strides(&shape);
    let mut total = 0.0;
    for (flat, v) in values.iter().enumerate() {
        if !v.is_finite() {
            return Err(Error::NumericalInstability(format!(
                "integrand is {v} at node {flat}"
            )));
        }
        let w: f64 = (0..shape.len()).map(|a| weights[a][(flat / st[a]) % shape[a]]).product();
        total += w * v;
    }
    Ok(total)
}

/// Integral of the unnormalized density of `pdf` over `limits` on a trapezoid grid sized by the
/// PDF's integration settings.
pub fn numeric<P: Pdf + ?Sized>(pdf: &P, limits: &Space) -> Result<f64> {
    let n = nodes_per_axis(limits.n_obs(), &pdf.settings().integration);
    log::debug!("{}: trapezoid integration with {n} nodes per axis", pdf.name());
    trapezoid(limits, &vec![n; limits.n_obs()], |grid| pdf.unnormalized_pdf(grid))
}
