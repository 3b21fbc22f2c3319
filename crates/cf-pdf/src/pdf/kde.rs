//! Exact one-dimensional Gaussian kernel density estimation.

use crate::data::Data;
use crate::pdf::{Capability, Pdf};
use cf_core::{Error, Result, Settings, Space};
use cf_prob::{ContinuousDistribution, NormalMixture};
use rand::RngCore;
use rand::distr::weighted::WeightedIndex;
use rand_distr::{Distribution, StandardNormal};
use rayon::prelude::*;
use std::fmt;
use std::str::FromStr;

/// Inter-quartile range of a standard normal.
const IQR_TO_SIGMA: f64 = 1.349;
const SILVERMAN_FACTOR: f64 = 0.9;
const SCOTT_FACTOR: f64 = 1.059;

/// Bandwidth policy of a [`GaussianKde1DimExact`].
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Bandwidth {
    /// One bandwidth for every kernel.
    Value(f64),
    /// One bandwidth per sample.
    PerPoint(Vec<f64>),
    /// `0.9 · min(σ, IQR/1.349) · N^(-1/5)`.
    #[default]
    Silverman,
    /// `1.059 · min(σ, IQR/1.349) · N^(-1/5)`.
    Scott,
    /// Silverman bandwidth scaled per sample by `sqrt(g / f(x_i))`, where `f` is a provisional
    /// Silverman estimate and `g` the geometric mean of `f` over the samples.
    Adaptive,
}

impl FromStr for Bandwidth {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "silverman" => Ok(Bandwidth::Silverman),
            "scott" => Ok(Bandwidth::Scott),
            "adaptive" | "adaptiveV1" => Ok(Bandwidth::Adaptive),
            other => Err(Error::Consistency(format!(
                "unknown bandwidth method '{other}', expected silverman, scott or adaptive"
            ))),
        }
    }
}

impl fmt::Display for Bandwidth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Bandwidth::Value(h) => write!(f, "{h}"),
            Bandwidth::PerPoint(v) => write!(f, "per-point[{}]", v.len()),
            Bandwidth::Silverman => f.write_str("silverman"),
            Bandwidth::Scott => f.write_str("scott"),
            Bandwidth::Adaptive => f.write_str("adaptive"),
        }
    }
}

/// Exact one-dimensional Gaussian kernel density estimate.
///
/// `p(x) = Σ_i w_i · φ((x - x_i)/h_i) / h_i` with normalized sample weights `w_i` (uniform `1/N`
/// when unweighted). Every kernel is evaluated, there is no binning.
///
/// The estimate is a proper density on the whole real line, so the integral over an unbounded
/// space is exactly one. Integrals over finite limits go through the numeric fallback.
#[derive(Debug, Clone)]
pub struct GaussianKde1DimExact {
    name: String,
    space: Space,
    mixture: NormalMixture,
    bandwidth_policy: Bandwidth,
    settings: Settings,
}

impl GaussianKde1DimExact {
    /// Build from sample positions with optional non-negative weights.
    pub fn new(
        space: Space,
        samples: Vec<f64>,
        bandwidth: Bandwidth,
        weights: Option<Vec<f64>>,
    ) -> Result<Self> {
        if space.n_obs() != 1 {
            return Err(Error::Validation(format!(
                "GaussianKde1DimExact is one-dimensional, got obs {:?}",
                space.obs()
            )));
        }
        if samples.is_empty() {
            return Err(Error::Validation(
                "GaussianKde1DimExact requires at least one sample".into(),
            ));
        }
        if samples.iter().any(|x| !x.is_finite()) {
            return Err(Error::Validation("GaussianKde1DimExact samples must be finite".into()));
        }

        let probs = match &weights {
            Some(w) => {
                if w.len() != samples.len() {
                    return Err(Error::Validation(format!(
                        "GaussianKde1DimExact weights length mismatch: expected {}, got {}",
                        samples.len(),
                        w.len()
                    )));
                }
                if w.iter().any(|x| !x.is_finite() || *x < 0.0) {
                    return Err(Error::Validation(
                        "GaussianKde1DimExact weights must be finite and >= 0".into(),
                    ));
                }
                let sum_w: f64 = w.iter().sum();
                if !(sum_w.is_finite() && sum_w > 0.0) {
                    return Err(Error::Validation(format!(
                        "GaussianKde1DimExact requires sum(weights) > 0, got {sum_w}"
                    )));
                }
                w.iter().map(|x| x / sum_w).collect::<Vec<_>>()
            }
            None => vec![1.0 / samples.len() as f64; samples.len()],
        };

        let scales = resolve_bandwidth(&bandwidth, &samples, &probs)?;
        let mixture = NormalMixture::new(samples, scales, probs)?;
        Ok(Self {
            name: "GaussianKDE1DimExact".to_string(),
            space,
            mixture,
            bandwidth_policy: bandwidth,
            settings: Settings::default(),
        })
    }

    /// Build from the column of `data` matching `space`.
    ///
    /// Weights attached to `data` are used unless `weights` is given too, which is an error.
    pub fn from_data(
        space: Space,
        data: &Data,
        bandwidth: Bandwidth,
        weights: Option<Vec<f64>>,
    ) -> Result<Self> {
        let weights = match (data.weights(), weights) {
            (Some(_), Some(_)) => {
                return Err(Error::Configuration(
                    "weights given explicitly for data that already carries weights".into(),
                ));
            }
            (Some(w), None) => Some(w.to_vec()),
            (None, w) => w,
        };
        let samples = data.columns_for(&space)?[0].to_vec();
        Self::new(space, samples, bandwidth, weights)
    }

    /// Rename.
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Replace the numeric settings used by the fallbacks.
    pub fn with_settings(mut self, settings: Settings) -> Self {
        self.settings = settings;
        self
    }

    /// Per-kernel bandwidths.
    pub fn bandwidth(&self) -> &[f64] {
        self.mixture.scales()
    }

    /// Policy the bandwidths were derived from.
    pub fn bandwidth_policy(&self) -> &Bandwidth {
        &self.bandwidth_policy
    }

    /// Kernel centers.
    pub fn samples(&self) -> &[f64] {
        self.mixture.locs()
    }

    /// Normalized kernel weights.
    pub fn probs(&self) -> &[f64] {
        self.mixture.probs()
    }
}

fn resolve_bandwidth(policy: &Bandwidth, samples: &[f64], probs: &[f64]) -> Result<Vec<f64>> {
    let n = samples.len();
    let scales = match policy {
        Bandwidth::Value(h) => vec![*h; n],
        Bandwidth::PerPoint(v) => {
            if v.len() != n {
                return Err(Error::Validation(format!(
                    "per-point bandwidth length mismatch: expected {n}, got {}",
                    v.len()
                )));
            }
            v.clone()
        }
        Bandwidth::Silverman => vec![rule_of_thumb(SILVERMAN_FACTOR, samples, probs)?; n],
        Bandwidth::Scott => vec![rule_of_thumb(SCOTT_FACTOR, samples, probs)?; n],
        Bandwidth::Adaptive => adaptive(samples, probs)?,
    };
    if let Some(h) = scales.iter().find(|h| !h.is_finite() || **h <= 0.0) {
        return Err(Error::Validation(format!("KDE bandwidth must be finite and > 0, got {h}")));
    }
    Ok(scales)
}

/// `factor · min(σ, IQR/1.349) · N^(-1/5)` with weighted σ and IQR.
fn rule_of_thumb(factor: f64, samples: &[f64], probs: &[f64]) -> Result<f64> {
    let support: Vec<(f64, f64)> =
        samples.iter().copied().zip(probs.iter().copied()).filter(|&(_, w)| w > 0.0).collect();
    let distinct = support.iter().any(|&(x, _)| x != support[0].0);
    if support.len() < 2 || !distinct {
        return Err(Error::Validation(
            "bandwidth heuristics need at least two distinct weighted samples".into(),
        ));
    }
    let mean: f64 = support.iter().map(|&(x, w)| w * x).sum();
    let var: f64 = support.iter().map(|&(x, w)| w * (x - mean).powi(2)).sum();
    let sigma = var.sqrt();
    let iqr = weighted_quantile(&support, 0.75) - weighted_quantile(&support, 0.25);
    let spread = if iqr > 0.0 { sigma.min(iqr / IQR_TO_SIGMA) } else { sigma };
    Ok(factor * spread * (samples.len() as f64).powf(-0.2))
}

/// Lower weighted quantile: the smallest sample whose cumulative weight reaches `q`.
fn weighted_quantile(support: &[(f64, f64)], q: f64) -> f64 {
    let mut sorted = support.to_vec();
    sorted.sort_by(|a, b| a.0.total_cmp(&b.0));
    let total: f64 = sorted.iter().map(|p| p.1).sum();
    let target = q * total;
    let mut acc = 0.0;
    for &(x, w) in &sorted {
        acc += w;
        if acc >= target {
            return x;
        }
    }
    sorted[sorted.len() - 1].0
}

/// Two-phase adaptive bandwidth: a provisional Silverman estimate sets the local scale.
fn adaptive(samples: &[f64], probs: &[f64]) -> Result<Vec<f64>> {
    let h = rule_of_thumb(SILVERMAN_FACTOR, samples, probs)?;
    let provisional =
        NormalMixture::new(samples.to_vec(), vec![h; samples.len()], probs.to_vec())?;
    let density: Vec<f64> = samples.par_iter().map(|&x| provisional.density(x)).collect();
    if density.iter().any(|f| !(f.is_finite() && *f > 0.0)) {
        return Err(Error::NumericalInstability(
            "provisional density vanishes at a sample; cannot adapt bandwidths".into(),
        ));
    }
    let log_g: f64 = density.iter().zip(probs).map(|(f, w)| w * f.ln()).sum();
    let g = log_g.exp();
    Ok(density.iter().map(|f| h * (g / f).sqrt()).collect())
}

impl Pdf for GaussianKde1DimExact {
    fn name(&self) -> &str {
        &self.name
    }

    fn space(&self) -> &Space {
        &self.space
    }

    fn settings(&self) -> &Settings {
        &self.settings
    }

    fn unnormalized_pdf(&self, x: &Data) -> Result<Vec<f64>> {
        let xs = x.columns_for(&self.space)?[0];
        Ok(xs.par_iter().map(|&v| self.mixture.density(v)).collect())
    }

    fn analytic_integrate(&self, limits: &Space) -> Result<Capability<f64>> {
        match limits.limits(0) {
            Some((lo, hi)) if lo == f64::NEG_INFINITY && hi == f64::INFINITY => {
                Ok(Capability::Supported(self.mixture.probs().iter().sum()))
            }
            _ => Ok(Capability::Unsupported),
        }
    }

    fn sample_with(
        &self,
        n: usize,
        limits: &Space,
        rng: &mut dyn RngCore,
    ) -> Result<Capability<Data>> {
        let (lo, hi) = limits
            .limits(0)
            .ok_or_else(|| Error::Validation(format!("{}: empty limits", self.name)))?;
        let mass = self.mixture.interval_probability(lo, hi);
        if mass.is_nan() || mass <= 0.0 {
            return Err(Error::NumericalInstability(format!(
                "{}: no probability mass in ({lo}, {hi})",
                self.name
            )));
        }
        let component = WeightedIndex::new(self.mixture.probs())
            .map_err(|e| Error::Computation(format!("{}: kernel weights: {e}", self.name)))?;
        let (locs, scales) = (self.mixture.locs(), self.mixture.scales());
        let max_rounds = self.settings.sampling.max_rounds;

        let mut out = Vec::with_capacity(n);
        let mut rounds = 0usize;
        while out.len() < n {
            if rounds >= max_rounds {
                return Err(Error::Computation(format!(
                    "{}: sampled {} of {n} points in {max_rounds} rounds",
                    self.name,
                    out.len()
                )));
            }
            rounds += 1;
            for _ in 0..(n - out.len()) {
                let i = component.sample(&mut *rng);
                let z: f64 = StandardNormal.sample(&mut *rng);
                let x = locs[i] + scales[i] * z;
                if x >= lo && x <= hi {
                    out.push(x);
                }
            }
        }
        Ok(Capability::Supported(Data::from_values(limits.clone(), out)?))
    }
}
