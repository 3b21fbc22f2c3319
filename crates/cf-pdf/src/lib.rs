//! # cf-pdf
//!
//! Probability density functions for convfit.
//!
//! This crate provides:
//! - Columnar [`Data`] over a [`Space`].
//! - A parameter graph: independent [`Parameter`]s, [`ComposedParameter`]s recorded on a
//!   reverse-mode tape, and an explicit [`ParamContext`].
//! - The [`Pdf`] trait with numeric integration and rejection sampling fallbacks.
//! - Wrapped closed-form distributions, an exact Gaussian KDE, sums, products, and an FFT-based
//!   convolution of two PDFs with linear or B-spline interpolation.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod data;
pub mod integrate;
pub mod interp;
pub mod param;
pub mod pdf;
pub mod sampling;

mod fft;
mod grid;

pub use cf_core::{Error, Result, Settings, Space};
pub use data::Data;
pub use interp::Interpolation;
pub use param::{
    ComplexParameter, ComposeRule, ComposedParameter, FIXED_PARAM_NAME, Param, ParamContext,
    ParamVars, Parameter, ParameterBuilder,
};
pub use pdf::{
    Bandwidth, Capability, DistFactory, DistParams, FftConvBuilder, FftConvConfig, FftConvPdf,
    GaussianKde1DimExact, NoSampling, ParamValues, Pdf, ProductPdf, SumPdf, WrapDistribution,
};
