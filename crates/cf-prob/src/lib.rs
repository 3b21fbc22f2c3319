//! Probability building blocks for convfit.
//!
//! This crate hosts the one-dimensional distributions that PDFs wrap:
//! - base distributions (density/CDF/quantile) behind [`ContinuousDistribution`]
//! - small numeric helpers (standard normal functions, stable log-sum-exp)

pub mod distributions;
pub mod exponential;
pub mod math;
pub mod mixture;
pub mod normal;
pub mod truncated_normal;
pub mod uniform;

pub use distributions::ContinuousDistribution;
pub use exponential::Exponential;
pub use mixture::NormalMixture;
pub use normal::Normal;
pub use truncated_normal::TruncatedNormal;
pub use uniform::Uniform;
