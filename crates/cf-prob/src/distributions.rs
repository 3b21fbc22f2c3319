//! Common interface of the one-dimensional continuous distributions in this crate.

/// A continuous distribution on the real line.
///
/// Implementations are cheap value types: they are rebuilt whenever their parameters change, so
/// constructors validate and methods never fail. Points outside the support have zero density.
pub trait ContinuousDistribution {
    /// Density at `x`.
    fn density(&self, x: f64) -> f64;

    /// Log-density at `x` (`-inf` outside the support).
    fn log_density(&self, x: f64) -> f64 {
        self.density(x).ln()
    }

    /// Cumulative distribution function at `x`.
    fn cumulative(&self, x: f64) -> f64;

    /// Inverse CDF at `p ∈ [0, 1]`, or `None` when no closed form is available.
    fn quantile(&self, p: f64) -> Option<f64>;

    /// Probability mass in `[lower, upper]`.
    fn interval_probability(&self, lower: f64, upper: f64) -> f64 {
        self.cumulative(upper) - self.cumulative(lower)
    }
}
