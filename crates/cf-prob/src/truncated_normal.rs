//! Normal distribution truncated to an interval.

use cf_core::{Error, Result};

use crate::distributions::ContinuousDistribution;
use crate::math::{std_normal_cdf, std_normal_pdf, std_normal_quantile};

/// `N(mu, sigma)` restricted to `[low, high]` and renormalized.
///
/// Bounds may be infinite, in which case the distribution reduces to the untruncated normal on
/// that side.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TruncatedNormal {
    mu: f64,
    sigma: f64,
    low: f64,
    high: f64,
    cdf_low: f64,
    mass: f64,
}

impl TruncatedNormal {
    /// Create a truncated normal.
    ///
    /// Fails when `sigma` is not positive, the bounds are unordered, or the interval carries no
    /// probability mass in double precision.
    pub fn new(mu: f64, sigma: f64, low: f64, high: f64) -> Result<Self> {
        if !mu.is_finite() {
            return Err(Error::Validation(format!("mu must be finite, got {mu}")));
        }
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(Error::Validation(format!("sigma must be finite and > 0, got {sigma}")));
        }
        if low.is_nan() || high.is_nan() || low >= high {
            return Err(Error::Validation(format!(
                "truncation bounds must satisfy low < high, got ({low}, {high})"
            )));
        }
        let cdf_low = std_normal_cdf((low - mu) / sigma);
        let mass = std_normal_cdf((high - mu) / sigma) - cdf_low;
        if mass.is_nan() || mass <= 0.0 {
            return Err(Error::NumericalInstability(format!(
                "truncation interval ({low}, {high}) has no mass under N({mu}, {sigma})"
            )));
        }
        Ok(Self { mu, sigma, low, high, cdf_low, mass })
    }

    /// Truncation interval.
    pub fn bounds(&self) -> (f64, f64) {
        (self.low, self.high)
    }
}

impl ContinuousDistribution for TruncatedNormal {
    fn density(&self, x: f64) -> f64 {
        if x < self.low || x > self.high {
            return 0.0;
        }
        std_normal_pdf((x - self.mu) / self.sigma) / (self.sigma * self.mass)
    }

    fn cumulative(&self, x: f64) -> f64 {
        if x <= self.low {
            return 0.0;
        }
        if x >= self.high {
            return 1.0;
        }
        ((std_normal_cdf((x - self.mu) / self.sigma) - self.cdf_low) / self.mass).clamp(0.0, 1.0)
    }

    fn quantile(&self, p: f64) -> Option<f64> {
        if !(0.0..=1.0).contains(&p) {
            return Some(f64::NAN);
        }
        let z = std_normal_quantile(self.cdf_low + p * self.mass);
        Some((self.mu + self.sigma * z).clamp(self.low, self.high))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::normal::Normal;
    use approx::assert_relative_eq;

    #[test]
    fn test_infinite_bounds_match_normal() {
        let t = TruncatedNormal::new(0.3, 1.2, f64::NEG_INFINITY, f64::INFINITY).unwrap();
        let n = Normal::new(0.3, 1.2).unwrap();
        for &x in &[-2.0, 0.0, 0.3, 1.7] {
            assert_relative_eq!(t.density(x), n.density(x), epsilon = 1e-14);
            assert_relative_eq!(t.cumulative(x), n.cumulative(x), epsilon = 1e-14);
        }
    }

    #[test]
    fn test_mass_inside_interval() {
        let t = TruncatedNormal::new(0.0, 1.0, -0.5, 2.0).unwrap();
        assert_eq!(t.density(-0.6), 0.0);
        assert_eq!(t.cumulative(-0.5), 0.0);
        assert_eq!(t.cumulative(2.0), 1.0);
        // Trapezoid over the support.
        let n = 20_000;
        let h = 2.5 / n as f64;
        let mut s = 0.5 * (t.density(-0.5) + t.density(2.0));
        for i in 1..n {
            s += t.density(-0.5 + i as f64 * h);
        }
        assert_relative_eq!(s * h, 1.0, epsilon = 1e-6);
    }

    #[test]
    fn test_quantile_stays_in_bounds() {
        let t = TruncatedNormal::new(1.0, 0.5, 0.0, 1.5).unwrap();
        for &p in &[0.0, 0.2, 0.5, 0.9, 1.0] {
            let q = t.quantile(p).unwrap();
            assert!((0.0..=1.5).contains(&q));
            assert_relative_eq!(t.cumulative(q), p, epsilon = 1e-9);
        }
    }

    #[test]
    fn test_massless_interval_rejected() {
        let err = TruncatedNormal::new(0.0, 1.0, 60.0, 70.0).unwrap_err();
        assert!(matches!(err, Error::NumericalInstability(_)));
        assert!(matches!(TruncatedNormal::new(0.0, 1.0, 2.0, 1.0), Err(Error::Validation(_))));
    }
}
