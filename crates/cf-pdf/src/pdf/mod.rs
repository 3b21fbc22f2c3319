//! Probability density functions (PDFs).

use crate::data::Data;
use crate::param::{Param, Parameter};
use cf_core::{Error, Result, Settings, Space};
use rand::RngCore;
use std::collections::BTreeMap;
use std::sync::{Arc, LazyLock};

mod composite;
mod fftconv;
mod kde;
mod wrap;

pub use composite::{ProductPdf, SumPdf};
pub use fftconv::{FftConvBuilder, FftConvConfig, FftConvPdf};
pub use kde::{Bandwidth, GaussianKde1DimExact};
pub use wrap::{DistFactory, DistParams, ParamValues, WrapDistribution};

static DEFAULT_SETTINGS: LazyLock<Settings> = LazyLock::new(Settings::default);

/// Outcome of an optional capability.
///
/// `Unsupported` is not an error: callers that receive it switch to a generic fallback.
#[derive(Debug, Clone, PartialEq)]
pub enum Capability<T> {
    /// The PDF provides the result itself.
    Supported(T),
    /// The PDF has no dedicated implementation.
    Unsupported,
}

impl<T> Capability<T> {
    /// Whether a result is present.
    pub fn is_supported(&self) -> bool {
        matches!(self, Capability::Supported(_))
    }

    /// The result, if present.
    pub fn supported(self) -> Option<T> {
        match self {
            Capability::Supported(v) => Some(v),
            Capability::Unsupported => None,
        }
    }
}

/// Normalizable density over a [`Space`].
///
/// Implementors provide the unnormalized density and, optionally, an analytic integral, a sampler
/// and a bound on the density. The provided methods turn those into normalized values, integrals
/// and samples, falling back to numeric integration and rejection sampling where a capability is
/// missing.
///
/// Nothing is cached: every call reads the live parameter values.
pub trait Pdf: Send + Sync {
    /// Name.
    fn name(&self) -> &str;

    /// Observables and default normalization range.
    fn space(&self) -> &Space;

    /// Shape parameters owned by this PDF (not by its children).
    fn params(&self) -> BTreeMap<String, Param> {
        BTreeMap::new()
    }

    /// Component PDFs.
    fn children(&self) -> Vec<Arc<dyn Pdf>> {
        Vec::new()
    }

    /// Numeric tunables used by the fallbacks.
    fn settings(&self) -> &Settings {
        &DEFAULT_SETTINGS
    }

    /// Density up to a constant, one value per point of `x`.
    fn unnormalized_pdf(&self, x: &Data) -> Result<Vec<f64>>;

    /// Integral of [`Pdf::unnormalized_pdf`] over `limits`, if known in closed form.
    fn analytic_integrate(&self, _limits: &Space) -> Result<Capability<f64>> {
        Ok(Capability::Unsupported)
    }

    /// `n` points inside `limits` drawn from the density, if a dedicated sampler exists.
    fn sample_with(
        &self,
        _n: usize,
        _limits: &Space,
        _rng: &mut dyn RngCore,
    ) -> Result<Capability<Data>> {
        Ok(Capability::Unsupported)
    }

    /// Upper bound of [`Pdf::unnormalized_pdf`] over `limits`, if cheaply known.
    fn max_density_hint(&self, _limits: &Space) -> Result<Option<f64>> {
        Ok(None)
    }

    /// Integral of the unnormalized density, analytic when possible and numeric otherwise.
    fn integrate_unnormalized(&self, limits: &Space) -> Result<f64> {
        let limits = align_limits(self.space(), limits)?;
        match self.analytic_integrate(&limits)? {
            Capability::Supported(v) => Ok(v),
            Capability::Unsupported => {
                log::debug!("{}: no analytic integral, integrating numerically", self.name());
                crate::integrate::numeric(self, &limits)
            }
        }
    }

    /// Normalized density at `x`, normalized over `norm_range` (default: [`Pdf::space`]).
    fn pdf(&self, x: &Data, norm_range: Option<&Space>) -> Result<Vec<f64>> {
        let norm = norm_range.unwrap_or(self.space());
        let z = self.integrate_unnormalized(norm)?;
        check_normalization(self.name(), z)?;
        let mut values = self.unnormalized_pdf(x)?;
        for v in &mut values {
            *v /= z;
        }
        Ok(values)
    }

    /// Probability of `limits`, normalized over `norm_range` (default: [`Pdf::space`]).
    fn integrate(&self, limits: &Space, norm_range: Option<&Space>) -> Result<f64> {
        let norm = norm_range.unwrap_or(self.space());
        let z = self.integrate_unnormalized(norm)?;
        check_normalization(self.name(), z)?;
        Ok(self.integrate_unnormalized(limits)? / z)
    }

    /// Draw `n` points inside `limits` (default: [`Pdf::space`]).
    ///
    /// Uses [`Pdf::sample_with`] when supported, rejection sampling otherwise.
    fn sample(&self, n: usize, limits: Option<&Space>, rng: &mut dyn RngCore) -> Result<Data> {
        let limits = align_limits(self.space(), limits.unwrap_or(self.space()))?;
        if n == 0 {
            return Ok(Data::empty(limits));
        }
        match self.sample_with(n, &limits, rng)? {
            Capability::Supported(data) => {
                if data.len() != n || data.n_obs() != limits.n_obs() {
                    return Err(Error::Computation(format!(
                        "{}: sampler returned {} points with {} obs, expected {n} with {}",
                        self.name(),
                        data.len(),
                        data.n_obs(),
                        limits.n_obs()
                    )));
                }
                Ok(data)
            }
            Capability::Unsupported => {
                log::debug!("{}: no dedicated sampler, using rejection sampling", self.name());
                crate::sampling::rejection_sample(self, n, &limits, rng)
            }
        }
    }

    /// Independent parameters of this PDF and its children, without duplicates.
    fn dependents(&self, only_floating: bool) -> Result<Vec<Parameter>> {
        let mut out: Vec<Parameter> = Vec::new();
        let push = |p: Parameter, out: &mut Vec<Parameter>| {
            if !out.iter().any(|q| q.ptr_eq(&p)) {
                out.push(p);
            }
        };
        for param in self.params().values() {
            for p in param.dependents(only_floating)? {
                push(p, &mut out);
            }
        }
        for child in self.children() {
            for p in child.dependents(only_floating)? {
                push(p, &mut out);
            }
        }
        Ok(out)
    }
}

/// `limits` with its axes reordered to match `space`.
pub(crate) fn align_limits(space: &Space, limits: &Space) -> Result<Space> {
    if limits.same_obs(space) {
        return Ok(limits.clone());
    }
    if limits.n_obs() != space.n_obs() {
        return Err(Error::Validation(format!(
            "limits over {:?} do not match obs {:?}",
            limits.obs(),
            space.obs()
        )));
    }
    limits.subspace(&space.obs())
}

fn check_normalization(name: &str, z: f64) -> Result<()> {
    if !z.is_finite() || z <= 0.0 {
        return Err(Error::NumericalInstability(format!(
            "{name}: normalization integral is {z}"
        )));
    }
    Ok(())
}

/// Hides the sampler of the wrapped PDF so that every consumer takes the fallback path.
///
/// Everything else is forwarded unchanged.
pub struct NoSampling<P> {
    inner: P,
}

impl<P: Pdf> NoSampling<P> {
    /// Wrap `inner`.
    pub fn new(inner: P) -> Self {
        Self { inner }
    }

    /// The wrapped PDF.
    pub fn inner(&self) -> &P {
        &self.inner
    }
}

impl<P: Pdf> Pdf for NoSampling<P> {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn space(&self) -> &Space {
        self.inner.space()
    }

    fn params(&self) -> BTreeMap<String, Param> {
        self.inner.params()
    }

    fn children(&self) -> Vec<Arc<dyn Pdf>> {
        self.inner.children()
    }

    fn settings(&self) -> &Settings {
        self.inner.settings()
    }

    fn unnormalized_pdf(&self, x: &Data) -> Result<Vec<f64>> {
        self.inner.unnormalized_pdf(x)
    }

    fn analytic_integrate(&self, limits: &Space) -> Result<Capability<f64>> {
        self.inner.analytic_integrate(limits)
    }

    fn max_density_hint(&self, limits: &Space) -> Result<Option<f64>> {
        self.inner.max_density_hint(limits)
    }

    fn integrate_unnormalized(&self, limits: &Space) -> Result<f64> {
        self.inner.integrate_unnormalized(limits)
    }

    fn pdf(&self, x: &Data, norm_range: Option<&Space>) -> Result<Vec<f64>> {
        self.inner.pdf(x, norm_range)
    }

    fn integrate(&self, limits: &Space, norm_range: Option<&Space>) -> Result<f64> {
        self.inner.integrate(limits, norm_range)
    }
}
