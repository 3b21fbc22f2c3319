//! Convolution of two PDFs on a regular grid through the FFT.
//!
//! On every call the function and the kernel are tabulated with a common spacing, convolved in
//! the frequency domain and interpolated. Nothing survives the call, so parameter changes of
//! either child take effect immediately.

use super::{Capability, Pdf, align_limits, check_normalization};
use crate::data::Data;
use crate::fft::{Tensor, convolve_full};
use crate::grid::{cartesian, linspace, strides};
use crate::integrate;
use crate::interp::{GridTable, Interpolation};
use cf_core::{Error, Result, Settings, Space};
use rand::RngCore;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::sync::Arc;

/// Headroom applied to the tabulated maximum when it is used as a sampling envelope.
const ENVELOPE_HEADROOM: f64 = 1.1;
/// Refinement of the quadrature grid relative to the tabulation grid.
const QUADRATURE_REFINEMENT: f64 = 4.0;

/// Data-driven convolution options; unset fields fall back to [`Settings::conv`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FftConvConfig {
    /// Kernel grid points per axis.
    pub n: Option<usize>,
    /// `linear`, `spline` or `spline:<k>`.
    pub interpolation: Option<String>,
}

impl FftConvConfig {
    /// Parse from JSON.
    pub fn from_json_str(s: &str) -> Result<Self> {
        Ok(serde_json::from_str(s)?)
    }
}

/// Builder for [`FftConvPdf`].
pub struct FftConvBuilder {
    func: Arc<dyn Pdf>,
    kernel: Arc<dyn Pdf>,
    n: Option<usize>,
    interpolation: Option<String>,
    obs: Option<Space>,
    settings: Option<Settings>,
    name: Option<String>,
}

impl FftConvBuilder {
    /// Kernel grid points per axis.
    pub fn n(mut self, n: usize) -> Self {
        self.n = Some(n);
        self
    }

    /// Interpolation scheme (`linear`, `spline`, `spline:<k>`).
    ///
    /// Parsed by [`FftConvBuilder::build`].
    pub fn interpolation(mut self, spec: impl Into<String>) -> Self {
        self.interpolation = Some(spec.into());
        self
    }

    /// Space of the convolution (default: the space of `func`).
    pub fn obs(mut self, obs: Space) -> Self {
        self.obs = Some(obs);
        self
    }

    /// Numeric settings.
    pub fn settings(mut self, settings: Settings) -> Self {
        self.settings = Some(settings);
        self
    }

    /// Name.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Apply the fields set in `config`.
    pub fn config(mut self, config: &FftConvConfig) -> Self {
        if let Some(n) = config.n {
            self.n = Some(n);
        }
        if let Some(interp) = &config.interpolation {
            self.interpolation = Some(interp.clone());
        }
        self
    }

    /// Validate and build.
    pub fn build(self) -> Result<FftConvPdf> {
        let settings = self.settings.unwrap_or_default();
        let n = self.n.unwrap_or(settings.conv.grid_points);
        if n < 2 {
            return Err(Error::Configuration(format!(
                "FFT convolution needs at least 2 kernel grid points, got {n}"
            )));
        }
        let interpolation: Interpolation = self
            .interpolation
            .as_deref()
            .unwrap_or(&settings.conv.interpolation)
            .parse()?;

        let space = self.obs.unwrap_or_else(|| self.func.space().clone());
        align_limits(&space, self.func.space()).map_err(|_| {
            Error::Validation(format!(
                "func obs {:?} do not match convolution obs {:?}",
                self.func.space().obs(),
                space.obs()
            ))
        })?;
        let kernel_limits = align_limits(&space, self.kernel.space()).map_err(|_| {
            Error::Validation(format!(
                "kernel obs {:?} do not match convolution obs {:?}",
                self.kernel.space().obs(),
                space.obs()
            ))
        })?;
        if !space.is_finite() || !kernel_limits.is_finite() {
            return Err(Error::Validation(format!(
                "FFT convolution needs finite limits, got obs {:?} and kernel {:?}",
                space.rect_limits(),
                kernel_limits.rect_limits()
            )));
        }

        Ok(FftConvPdf {
            name: self.name.unwrap_or_else(|| "FftConv".into()),
            func: self.func,
            kernel: self.kernel,
            space,
            kernel_limits,
            n,
            interpolation,
            settings,
        })
    }
}

/// Convolution `(f ∗ g)(x) = ∫ f(y) g(x − y) dy` of `func` with `kernel`, in any dimension.
///
/// The kernel is tabulated with `n` points per axis over its own space; the function uses the
/// same spacing over the convolution limits widened by the kernel support. Both are evaluated
/// normalized over their own spaces.
pub struct FftConvPdf {
    name: String,
    func: Arc<dyn Pdf>,
    kernel: Arc<dyn Pdf>,
    space: Space,
    kernel_limits: Space,
    n: usize,
    interpolation: Interpolation,
    settings: Settings,
}

struct ConvTable {
    grid: GridTable,
    step: Vec<f64>,
}

impl FftConvPdf {
    /// Start building the convolution of `func` with `kernel`.
    pub fn builder(func: Arc<dyn Pdf>, kernel: Arc<dyn Pdf>) -> FftConvBuilder {
        FftConvBuilder {
            func,
            kernel,
            n: None,
            interpolation: None,
            obs: None,
            settings: None,
            name: None,
        }
    }

    /// Kernel grid points per axis.
    pub fn n(&self) -> usize {
        self.n
    }

    /// Interpolation scheme.
    pub fn interpolation(&self) -> Interpolation {
        self.interpolation
    }

    /// The convolved function.
    pub fn func(&self) -> &Arc<dyn Pdf> {
        &self.func
    }

    /// The kernel.
    pub fn kernel(&self) -> &Arc<dyn Pdf> {
        &self.kernel
    }

    /// Bounding box of the convolution space and `extra`.
    fn region(&self, extra: &Space) -> Result<Space> {
        hull(&self.space, &align_limits(&self.space, extra)?)
    }

    fn require_finite(&self, limits: &Space) -> Result<()> {
        if limits.is_finite() {
            return Ok(());
        }
        Err(Error::NumericalInstability(format!(
            "{}: integration over non-finite limits {:?}",
            self.name,
            limits.rect_limits()
        )))
    }

    /// Tabulate the convolution over `region` plus a margin of a few nodes.
    fn build_table(&self, region: &Space) -> Result<ConvTable> {
        let (k_lo, k_hi) = self.kernel_limits.rect_limits();
        let n = self.n;
        let margin = self.interpolation.spline_order().unwrap_or(0) + 2;

        let mut step = Vec::with_capacity(region.n_obs());
        let mut kernel_nodes = Vec::with_capacity(region.n_obs());
        let mut func_nodes = Vec::with_capacity(region.n_obs());
        let mut func_limits = Vec::with_capacity(region.n_obs());
        for (a, axis) in region.axes().iter().enumerate() {
            let h = (k_hi[a] - k_lo[a]) / (n - 1) as f64;
            let f0 = axis.lower - k_hi[a];
            let nf = ((axis.upper - k_lo[a] - f0) / h - 1e-9).ceil() as usize + 1;
            step.push(h);
            kernel_nodes.push(linspace(k_lo[a], k_hi[a], n));
            func_nodes.push((0..nf).map(|i| f0 + i as f64 * h).collect::<Vec<_>>());
            func_limits.push((f0, f0 + (nf - 1) as f64 * h));
        }

        let func_space = region.with_limits(&func_limits)?;
        let func_grid = cartesian(&func_space, &func_nodes)?;
        let kernel_grid = cartesian(&self.kernel_limits, &kernel_nodes)?;
        let func_values = self.tabulate(self.func.as_ref(), &func_grid)?;
        let kernel_values = self.tabulate(self.kernel.as_ref(), &kernel_grid)?;

        let func_shape: Vec<usize> = func_nodes.iter().map(Vec::len).collect();
        log::debug!(
            "{}: func grid {func_shape:?}, kernel grid {n}^{}, {}",
            self.name,
            region.n_obs(),
            self.interpolation
        );
        let conv = convolve_full(
            &Tensor::new(func_shape, func_values)?,
            &Tensor::new(vec![n; region.n_obs()], kernel_values)?,
        )?;

        // Output node k sits at lower - (n - 1) h + k h, so node n - 1 is the region's lower edge.
        let mut ranges = Vec::with_capacity(region.n_obs());
        let mut origin = Vec::with_capacity(region.n_obs());
        for (a, axis) in region.axes().iter().enumerate() {
            let h = step[a];
            let first = (n - 1).saturating_sub(margin);
            let inner = (axis.width() / h - 1e-9).ceil() as usize;
            let last = (n - 1 + inner + margin).min(conv.shape[a] - 1);
            origin.push(axis.lower + (first as f64 - (n - 1) as f64) * h);
            ranges.push(first..last + 1);
        }
        let cell: f64 = step.iter().product();
        let block = sub_block(&conv, &ranges)?;
        let values = block.values.into_iter().map(|v| v * cell).collect();
        let grid = GridTable::new(origin, step.clone(), block.shape, values, self.interpolation)?;
        Ok(ConvTable { grid, step })
    }

    /// Normalized density of `pdf` on `grid`, with non-finite values replaced by zero.
    fn tabulate(&self, pdf: &dyn Pdf, grid: &Data) -> Result<Vec<f64>> {
        let mut values = pdf.pdf(grid, None)?;
        let mut bad = 0usize;
        for v in &mut values {
            if !v.is_finite() {
                *v = 0.0;
                bad += 1;
            }
        }
        if bad > 0 {
            log::warn!(
                "{}: {bad} of {} grid values of '{}' are not finite, set to zero",
                self.name,
                values.len(),
                pdf.name()
            );
        }
        Ok(values)
    }

    fn eval_table(&self, table: &ConvTable, x: &Data) -> Result<Vec<f64>> {
        let cols = x.columns_for(&self.space)?;
        Ok((0..x.len())
            .into_par_iter()
            .map(|i| {
                let point: Vec<f64> = cols.iter().map(|c| c[i]).collect();
                table.grid.eval(&point).max(0.0)
            })
            .collect())
    }

    fn integrate_table(&self, table: &ConvTable, limits: &Space) -> Result<f64> {
        let cap = integrate::nodes_per_axis(limits.n_obs(), &self.settings.integration);
        let nodes: Vec<usize> = limits
            .axes()
            .iter()
            .zip(&table.step)
            .map(|(axis, h)| {
                ((axis.width() * QUADRATURE_REFINEMENT / h).ceil() as usize + 1).clamp(2, cap)
            })
            .collect();
        integrate::trapezoid(limits, &nodes, |grid| self.eval_table(table, grid))
    }
}

/// Smallest box containing `a` and `b` (same axis order).
fn hull(a: &Space, b: &Space) -> Result<Space> {
    let limits: Vec<(f64, f64)> = a
        .axes()
        .iter()
        .zip(b.axes())
        .map(|(x, y)| (x.lower.min(y.lower), x.upper.max(y.upper)))
        .collect();
    a.with_limits(&limits)
}

/// Copy of the hyper-rectangle `ranges` out of `t`.
fn sub_block(t: &Tensor, ranges: &[std::ops::Range<usize>]) -> Result<Tensor> {
    let shape: Vec<usize> = ranges.iter().map(|r| r.len()).collect();
    let out_strides = strides(&shape);
    let in_strides = strides(&t.shape);
    let total: usize = shape.iter().product();
    let values = (0..total)
        .map(|flat| {
            let src: usize = (0..shape.len())
                .map(|a| (ranges[a].start + (flat / out_strides[a]) % shape[a]) * in_strides[a])
                .sum();
            t.values[src]
        })
        .collect();
    Tensor::new(shape, values)
}

/// `pdf.sample_with` over `limits` aligned to its space; `None` when unsupported.
fn sample_child(
    pdf: &dyn Pdf,
    n: usize,
    limits: &Space,
    rng: &mut dyn RngCore,
) -> Result<Option<Data>> {
    let limits = align_limits(pdf.space(), limits)?;
    match pdf.sample_with(n, &limits, rng)? {
        Capability::Supported(d) if d.len() == n => Ok(Some(d)),
        Capability::Supported(d) => Err(Error::Computation(format!(
            "{}: sampler returned {} points, expected {n}",
            pdf.name(),
            d.len()
        ))),
        Capability::Unsupported => Ok(None),
    }
}

impl Pdf for FftConvPdf {
    fn name(&self) -> &str {
        &self.name
    }

    fn space(&self) -> &Space {
        &self.space
    }

    fn children(&self) -> Vec<Arc<dyn Pdf>> {
        vec![self.func.clone(), self.kernel.clone()]
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn unnormalized_pdf(&self, x: &Data) -> Result<Vec<f64>> {
        let table = self.build_table(&self.space)?;
        self.eval_table(&table, x)
    }

    fn analytic_integrate(&self, limits: &Space) -> Result<Capability<f64>> {
        self.require_finite(limits)?;
        let table = self.build_table(&self.region(limits)?)?;
        Ok(Capability::Supported(self.integrate_table(&table, limits)?))
    }

    fn max_density_hint(&self, limits: &Space) -> Result<Option<f64>> {
        let table = self.build_table(&self.region(limits)?)?;
        let max = table.grid.max_value();
        Ok((max.is_finite() && max > 0.0).then_some(max * ENVELOPE_HEADROOM))
    }

    fn pdf(&self, x: &Data, norm_range: Option<&Space>) -> Result<Vec<f64>> {
        let norm = align_limits(&self.space, norm_range.unwrap_or(&self.space))?;
        self.require_finite(&norm)?;
        let table = self.build_table(&self.region(&norm)?)?;
        let z = self.integrate_table(&table, &norm)?;
        check_normalization(&self.name, z)?;
        let mut values = self.eval_table(&table, x)?;
        for v in &mut values {
            *v /= z;
        }
        Ok(values)
    }

    fn integrate(&self, limits: &Space, norm_range: Option<&Space>) -> Result<f64> {
        let norm = align_limits(&self.space, norm_range.unwrap_or(&self.space))?;
        let limits = align_limits(&self.space, limits)?;
        self.require_finite(&norm)?;
        self.require_finite(&limits)?;
        let region = hull(&self.region(&norm)?, &limits)?;
        let table = self.build_table(&region)?;
        let z = self.integrate_table(&table, &norm)?;
        check_normalization(&self.name, z)?;
        Ok(self.integrate_table(&table, &limits)? / z)
    }

    fn sample_with(
        &self,
        n: usize,
        limits: &Space,
        rng: &mut dyn RngCore,
    ) -> Result<Capability<Data>> {
        if !limits.is_finite() {
            return Err(Error::NumericalInstability(format!(
                "{}: sampling requires finite limits, got {:?}",
                self.name,
                limits.rect_limits()
            )));
        }
        // Any x inside `limits` is reached from y = x - z with z in the kernel space.
        let (k_lo, k_hi) = self.kernel_limits.rect_limits();
        let padded: Vec<(f64, f64)> = limits
            .axes()
            .iter()
            .enumerate()
            .map(|(a, axis)| (axis.lower - k_hi[a], axis.upper - k_lo[a]))
            .collect();
        let padded = limits.with_limits(&padded)?;

        let sampling = &self.settings.sampling;
        let mut out = Data::empty(limits.clone());
        let mut rate = 1.0f64;
        for _ in 0..sampling.max_rounds {
            let need = n.saturating_sub(out.len());
            if need == 0 {
                break;
            }
            let m =
                ((need as f64 / rate).ceil() as usize).clamp(need, sampling.batch_size.max(need));
            let Some(z) = sample_child(self.kernel.as_ref(), m, &self.kernel_limits, rng)? else {
                return Ok(Capability::Unsupported);
            };
            let Some(y) = sample_child(self.func.as_ref(), m, &padded, rng)? else {
                return Ok(Capability::Unsupported);
            };
            let columns: Vec<Vec<f64>> = y
                .columns_for(limits)?
                .into_iter()
                .zip(z.columns_for(limits)?)
                .map(|(ys, zs)| ys.iter().zip(zs).map(|(a, b)| a + b).collect())
                .collect();
            let mut batch = Data::from_columns(limits.clone(), columns, None)?;
            batch.retain_inside(limits)?;
            rate = (batch.len() as f64 / m as f64).max(1e-3);
            out.extend(&batch)?;
        }
        if out.len() < n {
            return Err(Error::Computation(format!(
                "{}: sampler produced {} of {n} points in {} rounds",
                self.name,
                out.len(),
                sampling.max_rounds
            )));
        }
        out.truncate(n);
        Ok(Capability::Supported(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pdf::{NoSampling, WrapDistribution};
    use crate::param::Parameter;
    use approx::assert_relative_eq;
    use cf_prob::{ContinuousDistribution, Normal};
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    fn obs() -> Space {
        Space::new("obs1", (-5.0, 5.0)).unwrap()
    }

    fn gauss(mu: impl Into<crate::param::Param>, sigma: f64) -> Arc<dyn Pdf> {
        Arc::new(WrapDistribution::gauss(mu, sigma, obs()).unwrap())
    }

    #[test]
    fn test_builder_defaults_and_validation() {
        let conv = FftConvPdf::builder(gauss(0.0, 0.5), gauss(0.0, 0.3)).build().unwrap();
        assert_eq!(conv.n(), 51);
        assert_eq!(conv.interpolation(), Interpolation::CUBIC);
        assert_eq!(conv.space().obs(), vec!["obs1"]);
        assert_eq!(conv.children().len(), 2);

        let err = FftConvPdf::builder(gauss(0.0, 0.5), gauss(0.0, 0.3)).n(1).build();
        assert!(matches!(err, Err(Error::Configuration(_))));
        let err = FftConvPdf::builder(gauss(0.0, 0.5), gauss(0.0, 0.3))
            .interpolation("spline:12")
            .build();
        assert!(matches!(err, Err(Error::Configuration(_))));

        let other: Arc<dyn Pdf> = Arc::new(
            WrapDistribution::gauss(0.0, 1.0, Space::new("obs2", (-1.0, 1.0)).unwrap()).unwrap(),
        );
        let err = FftConvPdf::builder(gauss(0.0, 0.5), other).build();
        assert!(matches!(err, Err(Error::Validation(_))));
    }

    #[test]
    fn test_spline_order_is_stored() {
        for (spec, order) in [("spline:5", Some(5)), ("spline:3", Some(3)), ("linear", None)] {
            let conv = FftConvPdf::builder(gauss(0.0, 0.5), gauss(0.0, 0.3))
                .interpolation(spec)
                .build()
                .unwrap();
            assert_eq!(conv.interpolation().spline_order(), order);
        }
    }

    #[test]
    fn test_config_from_json() {
        let cfg = FftConvConfig::from_json_str(r#"{"n": 80, "interpolation": "linear"}"#).unwrap();
        let conv =
            FftConvPdf::builder(gauss(0.0, 0.5), gauss(0.0, 0.3)).config(&cfg).build().unwrap();
        assert_eq!(conv.n(), 80);
        assert_eq!(conv.interpolation(), Interpolation::Linear);
        assert!(FftConvConfig::from_json_str(r#"{"grid": 3}"#).is_err());
    }

    #[test]
    fn test_two_gaussians_give_gaussian() {
        let expected = Normal::new(0.0, (0.5f64 * 0.5 + 0.3 * 0.3).sqrt()).unwrap();
        let x = Data::from_values(obs(), vec![-1.0, 0.0, 0.4, 1.5]).unwrap();
        for (spec, tol) in [("spline", 1e-2), ("spline:5", 1e-2), ("linear", 2e-2)] {
            let conv = FftConvPdf::builder(gauss(0.0, 0.5), gauss(0.0, 0.3))
                .n(100)
                .interpolation(spec)
                .build()
                .unwrap();
            let p = conv.pdf(&x, None).unwrap();
            for (v, xi) in p.iter().zip(x.column(0).unwrap()) {
                assert_relative_eq!(*v, expected.density(*xi), max_relative = tol);
            }
            assert_relative_eq!(conv.integrate(&obs(), None).unwrap(), 1.0, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_partial_integral() {
        let conv = FftConvPdf::builder(gauss(0.0, 0.5), gauss(0.0, 0.3)).n(100).build().unwrap();
        let right = Space::new("obs1", (0.0, 5.0)).unwrap();
        assert_relative_eq!(conv.integrate(&right, None).unwrap(), 0.5, epsilon = 2e-3);
    }

    #[test]
    fn test_infinite_limits_rejected() {
        let conv = FftConvPdf::builder(gauss(0.0, 0.5), gauss(0.0, 0.3)).build().unwrap();
        let inf = Space::new("obs1", (0.0, f64::INFINITY)).unwrap();
        assert!(matches!(conv.analytic_integrate(&inf), Err(Error::NumericalInstability(_))));
    }

    #[test]
    fn test_parameter_change_moves_density() {
        let mu = Parameter::new("mu", 0.0).unwrap();
        let conv = FftConvPdf::builder(gauss(&mu, 0.5), gauss(0.0, 0.3)).n(100).build().unwrap();
        assert_eq!(conv.dependents(true).unwrap().len(), 1);
        let x = Data::from_values(obs(), vec![1.0]).unwrap();
        let before = conv.pdf(&x, None).unwrap()[0];
        mu.set_value(1.0).unwrap();
        let after = conv.pdf(&x, None).unwrap()[0];
        assert!(after > 2.0 * before, "{before} -> {after}");
    }

    #[test]
    fn test_sampler_falls_back_without_kernel_sampler() {
        let kernel: Arc<dyn Pdf> =
            Arc::new(NoSampling::new(WrapDistribution::gauss(0.0, 0.3, obs()).unwrap()));
        let conv = FftConvPdf::builder(gauss(0.0, 0.5), kernel).n(100).build().unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        assert_eq!(conv.sample_with(10, &obs(), &mut rng).unwrap(), Capability::Unsupported);
        let d = conv.sample(500, None, &mut rng).unwrap();
        assert_eq!(d.len(), 500);
        assert!(d.column(0).unwrap().iter().all(|x| (-5.0..=5.0).contains(x)));
    }

    #[test]
    fn test_custom_sampler_moments() {
        let conv = FftConvPdf::builder(gauss(1.0, 0.4), gauss(0.0, 0.3)).n(100).build().unwrap();
        let mut rng = StdRng::seed_from_u64(17);
        let d = match conv.sample_with(20_000, &obs(), &mut rng).unwrap() {
            Capability::Supported(d) => d,
            Capability::Unsupported => panic!("both children can sample"),
        };
        let xs = d.column(0).unwrap();
        let mean = xs.iter().sum::<f64>() / xs.len() as f64;
        let std = (xs.iter().map(|x| (x - mean).powi(2)).sum::<f64>() / xs.len() as f64).sqrt();
        assert!((mean - 1.0).abs() < 0.02, "mean {mean}");
        assert!((std - 0.5).abs() < 0.02, "std {std}");
    }
}
