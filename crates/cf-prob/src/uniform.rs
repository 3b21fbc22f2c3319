//! Uniform distribution.

use cf_core::{Error, Result};

use crate::distributions::ContinuousDistribution;

/// Constant density on `[low, high)`, zero elsewhere.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Uniform {
    low: f64,
    high: f64,
}

impl Uniform {
    /// Create a uniform distribution; both bounds finite and `low < high`.
    pub fn new(low: f64, high: f64) -> Result<Self> {
        if !low.is_finite() || !high.is_finite() || low >= high {
            return Err(Error::Validation(format!(
                "uniform bounds must be finite with low < high, got ({low}, {high})"
            )));
        }
        Ok(Self { low, high })
    }

    /// Lower bound.
    pub fn low(&self) -> f64 {
        self.low
    }

    /// Upper bound.
    pub fn high(&self) -> f64 {
        self.high
    }
}

impl ContinuousDistribution for Uniform {
    fn density(&self, x: f64) -> f64 {
        if x >= self.low && x < self.high { 1.0 / (self.high - self.low) } else { 0.0 }
    }

    fn cumulative(&self, x: f64) -> f64 {
        ((x - self.low) / (self.high - self.low)).clamp(0.0, 1.0)
    }

    fn quantile(&self, p: f64) -> Option<f64> {
        if !(0.0..=1.0).contains(&p) {
            return Some(f64::NAN);
        }
        Some(self.low + p * (self.high - self.low))
    }
}
