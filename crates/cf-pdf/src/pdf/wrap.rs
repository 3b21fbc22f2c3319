//! One-dimensional PDFs backed by an analytic distribution.

use crate::data::Data;
use crate::param::Param;
use crate::pdf::{Capability, Pdf};
use cf_core::{Error, Result, Settings, Space};
use cf_prob::{ContinuousDistribution, Exponential, Normal, TruncatedNormal, Uniform};
use rand::{Rng, RngCore};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Named scalar values handed to a distribution constructor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ParamValues(BTreeMap<String, f64>);

impl ParamValues {
    /// Empty set.
    pub fn new() -> Self {
        Self::default()
    }

    /// Add or replace a value.
    pub fn insert(&mut self, name: impl Into<String>, value: f64) {
        self.0.insert(name.into(), value);
    }

    /// Value called `name`.
    pub fn get(&self, name: &str) -> Result<f64> {
        self.0.get(name).copied().ok_or_else(|| {
            Error::Validation(format!("distribution argument '{name}' was not provided"))
        })
    }
}

impl<S: Into<String>> FromIterator<(S, f64)> for ParamValues {
    fn from_iter<I: IntoIterator<Item = (S, f64)>>(iter: I) -> Self {
        Self(iter.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }
}

/// Closure producing distribution arguments on demand.
pub type DistFactory = dyn Fn() -> Result<ParamValues> + Send + Sync;

/// Source of the distribution arguments.
#[derive(Clone)]
pub enum DistParams {
    /// Argument name → parameter; values are read at every access.
    Static(BTreeMap<String, Param>),
    /// Re-invoked at every access.
    Factory(Arc<DistFactory>),
}

impl DistParams {
    /// Current argument values.
    pub fn values(&self) -> Result<ParamValues> {
        match self {
            DistParams::Static(params) => params
                .iter()
                .map(|(k, p)| Ok((k.clone(), p.value()?)))
                .collect::<Result<ParamValues>>(),
            DistParams::Factory(f) => f(),
        }
    }
}

type Builder<D> = dyn Fn(&ParamValues) -> Result<D> + Send + Sync;

/// Adapts a [`ContinuousDistribution`] into a [`Pdf`] over a one-dimensional space.
///
/// The distribution is rebuilt from the live parameter values on every call. Integrals use the
/// CDF, sampling inverts it through the quantile when the distribution has one.
pub struct WrapDistribution<D> {
    name: String,
    space: Space,
    params: BTreeMap<String, Param>,
    dist_params: DistParams,
    build: Arc<Builder<D>>,
    settings: Settings,
}

impl<D: ContinuousDistribution + 'static> WrapDistribution<D> {
    /// Wrap a distribution built by `build` from the values of `dist_params`.
    ///
    /// `params` are the shape parameters reported by [`Pdf::params`].
    pub fn new<F>(
        name: impl Into<String>,
        space: Space,
        params: BTreeMap<String, Param>,
        dist_params: DistParams,
        build: F,
    ) -> Result<Self>
    where
        F: Fn(&ParamValues) -> Result<D> + Send + Sync + 'static,
    {
        let name = name.into();
        if space.n_obs() != 1 {
            return Err(Error::Validation(format!(
                "{name} is one-dimensional, got obs {:?}",
                space.obs()
            )));
        }
        Ok(Self {
            name,
            space,
            params,
            dist_params,
            build: Arc::new(build),
            settings: Settings::default(),
        })
    }

    /// Replace the numeric settings used by the fallbacks.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Distribution at the current parameter values.
    pub fn distribution(&self) -> Result<D> {
        let values = self.dist_params.values()?;
        (self.build)(&values)
    }

    fn finite_limits(&self, limits: &Space) -> Result<(f64, f64)> {
        let (lo, hi) = limits
            .limits(0)
            .ok_or_else(|| Error::Validation(format!("{}: empty limits", self.name)))?;
        if !lo.is_finite() || !hi.is_finite() {
            return Err(Error::NumericalInstability(format!(
                "{}: analytic integral requires finite limits, got ({lo}, {hi})",
                self.name
            )));
        }
        Ok((lo, hi))
    }
}

fn static_params(entries: Vec<(&str, &str, Param)>) -> (BTreeMap<String, Param>, DistParams) {
    let mut params = BTreeMap::new();
    let mut dist = BTreeMap::new();
    for (name, arg, p) in entries {
        params.insert(name.to_string(), p.clone());
        dist.insert(arg.to_string(), p);
    }
    (params, DistParams::Static(dist))
}

impl WrapDistribution<Normal> {
    /// Normal distribution with mean `mu` and width `sigma`.
    pub fn gauss(mu: impl Into<Param>, sigma: impl Into<Param>, obs: Space) -> Result<Self> {
        let (params, dist) =
            static_params(vec![("mu", "loc", mu.into()), ("sigma", "scale", sigma.into())]);
        Self::new("Gauss", obs, params, dist, |v| Normal::new(v.get("loc")?, v.get("scale")?))
    }
}

impl WrapDistribution<Uniform> {
    /// Constant between `low` and `high`, zero outside.
    pub fn uniform(low: impl Into<Param>, high: impl Into<Param>, obs: Space) -> Result<Self> {
        let (params, dist) =
            static_params(vec![("low", "low", low.into()), ("high", "high", high.into())]);
        Self::new("Uniform", obs, params, dist, |v| Uniform::new(v.get("low")?, v.get("high")?))
    }
}

impl WrapDistribution<Exponential> {
    /// Exponential decay `rate · exp(-rate · x)` for `x >= 0`.
    pub fn exponential(rate: impl Into<Param>, obs: Space) -> Result<Self> {
        let (params, dist) = static_params(vec![("rate", "rate", rate.into())]);
        Self::new("Exponential", obs, params, dist, |v| Exponential::new(v.get("rate")?))
    }
}

impl WrapDistribution<TruncatedNormal> {
    /// Normal distribution that is zero outside `[low, high]`.
    pub fn truncated_gauss(
        mu: impl Into<Param>,
        sigma: impl Into<Param>,
        low: impl Into<Param>,
        high: impl Into<Param>,
        obs: Space,
    ) -> Result<Self> {
        let (params, dist) = static_params(vec![
            ("mu", "loc", mu.into()),
            ("sigma", "scale", sigma.into()),
            ("low", "low", low.into()),
            ("high", "high", high.into()),
        ]);
        Self::new("TruncatedGauss", obs, params, dist, |v| {
            TruncatedNormal::new(v.get("loc")?, v.get("scale")?, v.get("low")?, v.get("high")?)
        })
    }
}

impl<D: ContinuousDistribution + 'static> Pdf for WrapDistribution<D> {
    fn name(&self) -> &str {
        &self.name
    }

    fn space(&self) -> &Space {
        &self.space
    }

    fn params(&self) -> BTreeMap<String, Param> {
        self.params.clone()
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn unnormalized_pdf(&self, x: &Data) -> Result<Vec<f64>> {
        let cols = x.columns_for(&self.space)?;
        let dist = self.distribution()?;
        Ok(cols[0].iter().map(|&v| dist.density(v)).collect())
    }

    fn analytic_integrate(&self, limits: &Space) -> Result<Capability<f64>> {
        let (lo, hi) = self.finite_limits(limits)?;
        let dist = self.distribution()?;
        Ok(Capability::Supported(dist.cumulative(hi) - dist.cumulative(lo)))
    }

    fn sample_with(
        &self,
        n: usize,
        limits: &Space,
        rng: &mut dyn RngCore,
    ) -> Result<Capability<Data>> {
        let dist = self.distribution()?;
        if dist.quantile(0.5).is_none() {
            return Ok(Capability::Unsupported);
        }
        let (lo, hi) = limits
            .limits(0)
            .ok_or_else(|| Error::Validation(format!("{}: empty limits", self.name)))?;
        let (p_lo, p_hi) = (dist.cumulative(lo), dist.cumulative(hi));
        if p_lo.is_nan() || p_hi.is_nan() || p_hi <= p_lo {
            return Err(Error::NumericalInstability(format!(
                "{}: no probability mass in ({lo}, {hi})",
                self.name
            )));
        }
        let mut xs = Vec::with_capacity(n);
        for _ in 0..n {
            let u = loop {
                let u: f64 = rng.random();
                if u > 0.0 {
                    break u;
                }
            };
            match dist.quantile(p_lo + u * (p_hi - p_lo)) {
                Some(x) => xs.push(x.clamp(lo, hi)),
                None => return Ok(Capability::Unsupported),
            }
        }
        Ok(Capability::Supported(Data::from_values(limits.clone(), xs)?))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::param::Parameter;
    use approx::assert_relative_eq;
    use cf_prob::NormalMixture;
    use rand::SeedableRng;
    use rand::rngs::StdRng;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn obs() -> Space {
        Space::new("obs1", (-5.0, 5.0)).unwrap()
    }

    #[test]
    fn test_gauss_normalized_over_space() {
        let g = WrapDistribution::gauss(0.0, 0.3, obs()).unwrap();
        let x = Data::from_values(obs(), vec![0.0, 0.3]).unwrap();
        let p = g.pdf(&x, None).unwrap();
        let n = Normal::new(0.0, 0.3).unwrap();
        assert_relative_eq!(p[0], n.density(0.0), max_relative = 1e-9);
        assert_relative_eq!(g.integrate(&obs(), None).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_integral_is_cdf_difference() {
        let u = WrapDistribution::uniform(-3.0, 0.3, obs()).unwrap();
        let part = Space::new("obs1", (-1.0, 0.0)).unwrap();
        assert_relative_eq!(u.integrate(&part, None).unwrap(), 1.0 / 3.3, epsilon = 1e-12);
    }

    #[test]
    fn test_non_finite_limits_are_unstable() {
        let inf = Space::new("obs1", (f64::NEG_INFINITY, 1.0)).unwrap();
        let g = WrapDistribution::gauss(0.0, 1.0, inf.clone()).unwrap();
        let err = g.analytic_integrate(&inf).unwrap_err();
        assert!(matches!(err, Error::NumericalInstability(_)));
    }

    #[test]
    fn test_parameters_are_read_live() {
        let mu = Parameter::new("mu", 0.0).unwrap();
        let g = WrapDistribution::gauss(&mu, 1.0, obs()).unwrap();
        let x = Data::from_values(obs(), vec![2.0]).unwrap();
        let before = g.pdf(&x, None).unwrap()[0];
        mu.set_value(2.0).unwrap();
        let after = g.pdf(&x, None).unwrap()[0];
        assert!(after > before);
        assert_eq!(g.dependents(true).unwrap().len(), 1);
    }

    #[test]
    fn test_factory_reinvoked_every_access() {
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        let factory: Arc<DistFactory> = Arc::new(move || -> Result<ParamValues> {
            counter.fetch_add(1, Ordering::SeqCst);
            Ok([("rate", 2.0)].into_iter().collect())
        });
        let e = WrapDistribution::new(
            "exp",
            Space::new("t", (0.0, 4.0)).unwrap(),
            BTreeMap::new(),
            DistParams::Factory(factory),
            |v| Exponential::new(v.get("rate")?),
        )
        .unwrap();
        let x = Data::from_values(e.space().clone(), vec![0.5]).unwrap();
        e.unnormalized_pdf(&x).unwrap();
        e.unnormalized_pdf(&x).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_analytic_sample_inside_limits() {
        let g = WrapDistribution::truncated_gauss(0.5, 1.0, -1.0, 2.0, obs()).unwrap();
        let mut rng = StdRng::seed_from_u64(7);
        let limits = Space::new("obs1", (0.0, 1.0)).unwrap();
        let d = g.sample(1000, Some(&limits), &mut rng).unwrap();
        assert_eq!(d.len(), 1000);
        assert!(d.column(0).unwrap().iter().all(|&x| (0.0..=1.0).contains(&x)));
    }

    #[test]
    fn test_no_quantile_falls_back_to_rejection() {
        let mix = WrapDistribution::new(
            "mix",
            obs(),
            BTreeMap::new(),
            DistParams::Static(BTreeMap::new()),
            |_| NormalMixture::new(vec![-1.0, 1.0], vec![0.3, 0.3], vec![1.0, 1.0]),
        )
        .unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        assert!(!mix.sample_with(10, &obs(), &mut rng).unwrap().is_supported());
        let d = mix.sample(2000, None, &mut rng).unwrap();
        let mean = d.column(0).unwrap().iter().sum::<f64>() / 2000.0;
        assert!(mean.abs() < 0.1, "mean {mean}");
    }

    #[test]
    fn test_two_dimensional_space_rejected() {
        let s = Space::from_axes(vec![("x", (0.0, 1.0)), ("y", (0.0, 1.0))]).unwrap();
        assert!(WrapDistribution::gauss(0.0, 1.0, s).is_err());
    }
}
