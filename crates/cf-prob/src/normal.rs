//! Normal distribution.

use cf_core::{Error, Result};

use crate::distributions::ContinuousDistribution;
use crate::math::{LN_SQRT_2PI, std_normal_cdf, std_normal_pdf, std_normal_quantile};

/// Normal distribution `N(mu, sigma)`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Normal {
    mu: f64,
    sigma: f64,
}

impl Normal {
    /// Create `N(mu, sigma)`; `sigma` must be finite and positive.
    pub fn new(mu: f64, sigma: f64) -> Result<Self> {
        if !mu.is_finite() {
            return Err(Error::Validation(format!("mu must be finite, got {mu}")));
        }
        if !sigma.is_finite() || sigma <= 0.0 {
            return Err(Error::Validation(format!("sigma must be finite and > 0, got {sigma}")));
        }
        Ok(Self { mu, sigma })
    }

    /// Location.
    pub fn mu(&self) -> f64 {
        self.mu
    }

    /// Scale.
    pub fn sigma(&self) -> f64 {
        self.sigma
    }
}

impl ContinuousDistribution for Normal {
    fn density(&self, x: f64) -> f64 {
        std_normal_pdf((x - self.mu) / self.sigma) / self.sigma
    }

    /// `log p(x) = -0.5 * ((x-mu)/sigma)^2 - ln(sigma) - ln(sqrt(2π))`
    fn log_density(&self, x: f64) -> f64 {
        let z = (x - self.mu) / self.sigma;
        -0.5 * z * z - self.sigma.ln() - LN_SQRT_2PI
    }

    fn cumulative(&self, x: f64) -> f64 {
        std_normal_cdf((x - self.mu) / self.sigma)
    }

    fn quantile(&self, p: f64) -> Option<f64> {
        Some(self.mu + self.sigma * std_normal_quantile(p))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn test_standard_at_zero() {
        let n = Normal::new(0.0, 1.0).unwrap();
        assert_relative_eq!(n.log_density(0.0), -LN_SQRT_2PI, epsilon = 1e-12);
        assert_relative_eq!(n.density(0.0).ln(), n.log_density(0.0), epsilon = 1e-12);
    }

    #[test]
    fn test_symmetry() {
        let n = Normal::new(0.0, 2.0).unwrap();
        assert_relative_eq!(n.density(1.3), n.density(-1.3), epsilon = 1e-15);
        assert_relative_eq!(n.cumulative(1.3) + n.cumulative(-1.3), 1.0, epsilon = 1e-14);
    }

    #[test]
    fn test_interval_probability() {
        let n = Normal::new(1.0, 0.5).unwrap();
        assert_relative_eq!(
            n.interval_probability(0.5, 1.5),
            0.682_689_492_137_086,
            epsilon = 1e-10
        );
        assert_relative_eq!(n.quantile(0.5).unwrap(), 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_invalid_sigma() {
        assert!(Normal::new(0.0, 0.0).is_err());
        assert!(Normal::new(0.0, -1.0).is_err());
        assert!(Normal::new(f64::NAN, 1.0).is_err());
    }
}
