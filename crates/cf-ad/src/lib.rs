//! # cf-ad
//!
//! Reverse-mode automatic differentiation for convfit.
//!
//! The [`tape::Tape`] records expression graphs of derived parameters. It provides gradients with
//! respect to every recorded leaf in one backward sweep, and the structural dependency set of a
//! node, which the parameter graph uses to discover which independent parameters a composed
//! quantity depends on.

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod tape;

pub use tape::{Tape, Var};
