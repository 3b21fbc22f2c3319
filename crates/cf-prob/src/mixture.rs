//! Finite mixtures of normal components.

use cf_core::{Error, Result};

use crate::distributions::ContinuousDistribution;
use crate::math::{std_normal_cdf, std_normal_pdf};

/// `Σ_i w_i N(loc_i, scale_i)` with weights normalized to one.
#[derive(Debug, Clone, PartialEq)]
pub struct NormalMixture {
    locs: Vec<f64>,
    scales: Vec<f64>,
    probs: Vec<f64>,
}

impl NormalMixture {
    /// Create a mixture. `weights` are non-negative, not all zero, and normalized here.
    pub fn new(locs: Vec<f64>, scales: Vec<f64>, weights: Vec<f64>) -> Result<Self> {
        let n = locs.len();
        if n == 0 {
            return Err(Error::Validation("mixture requires at least one component".into()));
        }
        if scales.len() != n || weights.len() != n {
            return Err(Error::Validation(format!(
                "mixture shape mismatch: {} locs, {} scales, {} weights",
                n,
                scales.len(),
                weights.len()
            )));
        }
        if let Some(&s) = scales.iter().find(|s| !s.is_finite() || **s <= 0.0) {
            return Err(Error::Validation(format!(
                "component scale must be finite and > 0, got {s}"
            )));
        }
        if let Some(&x) = locs.iter().find(|x| !x.is_finite()) {
            return Err(Error::Validation(format!("component location must be finite, got {x}")));
        }
        if let Some(&w) = weights.iter().find(|w| !w.is_finite() || **w < 0.0) {
            return Err(Error::Validation(format!(
                "mixture weight must be finite and >= 0, got {w}"
            )));
        }
        let total: f64 = weights.iter().sum();
        if total <= 0.0 {
            return Err(Error::Validation("mixture weights sum to zero".into()));
        }
        let probs = weights.into_iter().map(|w| w / total).collect();
        Ok(Self { locs, scales, probs })
    }

    /// Number of components.
    pub fn len(&self) -> usize {
        self.locs.len()
    }

    /// Always false; a mixture has at least one component.
    pub fn is_empty(&self) -> bool {
        self.locs.is_empty()
    }

    /// Component locations.
    pub fn locs(&self) -> &[f64] {
        &self.locs
    }

    /// Component scales.
    pub fn scales(&self) -> &[f64] {
        &self.scales
    }

    /// Normalized component probabilities.
    pub fn probs(&self) -> &[f64] {
        &self.probs
    }
}

impl ContinuousDistribution for NormalMixture {
    fn density(&self, x: f64) -> f64 {
        self.locs
            .iter()
            .zip(&self.scales)
            .zip(&self.probs)
            .map(|((&m, &s), &p)| p * std_normal_pdf((x - m) / s) / s)
            .sum()
    }

    fn cumulative(&self, x: f64) -> f64 {
        self.locs
            .iter()
            .zip(&self.scales)
            .zip(&self.probs)
            .map(|((&m, &s), &p)| p * std_normal_cdf((x - m) / s))
            .sum::<f64>()
            .clamp(0.0, 1.0)
    }

    /// Mixtures have no closed-form inverse CDF.
    fn quantile(&self, _p: f64) -> Option<f64> {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normal::Normal;
    use approx::assert_relative_eq;

    #[test]
    fn test_single_component_is_normal() {
        let m = NormalMixture::new(vec![1.0], vec![0.4], vec![3.0]).unwrap();
        let n = Normal::new(1.0, 0.4).unwrap();
        assert_relative_eq!(m.density(0.7), n.density(0.7), epsilon = 1e-14);
        assert_relative_eq!(m.probs()[0], 1.0);
        assert!(m.quantile(0.5).is_none());
    }

    #[test]
    fn test_weights_normalized() {
        let m = NormalMixture::new(vec![-1.0, 1.0], vec![1.0, 1.0], vec![1.0, 3.0]).unwrap();
        assert_relative_eq!(m.probs()[0], 0.25);
        assert_relative_eq!(m.cumulative(1e3), 1.0, epsilon = 1e-15);
        assert_relative_eq!(m.cumulative(-1e3), 0.0, epsilon = 1e-15);
    }

    #[test]
    fn test_invalid_inputs() {
        assert!(NormalMixture::new(vec![], vec![], vec![]).is_err());
        assert!(NormalMixture::new(vec![0.0], vec![1.0, 2.0], vec![1.0]).is_err());
        assert!(NormalMixture::new(vec![0.0], vec![0.0], vec![1.0]).is_err());
        assert!(NormalMixture::new(vec![0.0], vec![1.0], vec![0.0]).is_err());
    }
}
