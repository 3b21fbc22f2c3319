//! # cf-core
//!
//! Core types, configuration, and error handling for convfit.
//!
//! This crate provides:
//! - The error taxonomy shared by every crate
//! - [`Space`]: named axes with rectangular limits
//! - [`Settings`]: explicit runtime configuration

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod error;
pub mod settings;
pub mod space;

pub use error::{Error, Result};
pub use settings::{ConvSettings, IntegrationSettings, SamplingSettings, Settings};
pub use space::{Axis, Space};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
