//! Runtime configuration.
//!
//! Settings are plain values passed to the objects that need them; there is no process-wide
//! mutable configuration. Every field has a default, so a JSON document only needs to carry the
//! values it overrides.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// FFT convolution defaults.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ConvSettings {
    /// Kernel grid points per axis when a convolution does not set `n` explicitly.
    pub grid_points: usize,
    /// Interpolation used when none is given (`linear`, `spline`, `spline:<k>`).
    pub interpolation: String,
}

impl Default for ConvSettings {
    fn default() -> Self {
        Self { grid_points: 51, interpolation: "spline".into() }
    }
}

/// Numeric (trapezoid) integration used when no analytic integral exists.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IntegrationSettings {
    /// Nodes per axis for one-dimensional integrals.
    pub points_per_axis: usize,
    /// Upper bound on the total number of nodes of a multi-dimensional grid.
    pub max_points: usize,
}

impl Default for IntegrationSettings {
    fn default() -> Self {
        Self { points_per_axis: 1025, max_points: 1 << 20 }
    }
}

/// Rejection sampling used when a PDF has no dedicated sampler.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SamplingSettings {
    /// Candidate points drawn per round.
    pub batch_size: usize,
    /// Rounds before giving up.
    pub max_rounds: usize,
    /// Uniform points used to estimate the envelope when the PDF gives no hint.
    pub scan_points: usize,
    /// Multiplier applied to the estimated density maximum.
    pub envelope_factor: f64,
}

impl Default for SamplingSettings {
    fn default() -> Self {
        Self { batch_size: 10_000, max_rounds: 1_000, scan_points: 10_000, envelope_factor: 1.25 }
    }
}

/// All tunables of the library.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Convolution defaults.
    pub conv: ConvSettings,
    /// Numeric integration.
    pub integration: IntegrationSettings,
    /// Fallback sampling.
    pub sampling: SamplingSettings,
}

impl Settings {
    /// Parse and validate settings from a JSON string.
    pub fn from_json_str(s: &str) -> Result<Self> {
        let settings: Settings = serde_json::from_str(s)?;
        settings.validate()?;
        Ok(settings)
    }

    /// Read, parse and validate settings from a JSON file.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Check value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.conv.grid_points < 2 {
            return Err(Error::Configuration(format!(
                "conv.grid_points must be >= 2, got {}",
                self.conv.grid_points
            )));
        }
        if self.integration.points_per_axis < 2 {
            return Err(Error::Configuration(format!(
                "integration.points_per_axis must be >= 2, got {}",
                self.integration.points_per_axis
            )));
        }
        if self.integration.max_points < 4 {
            return Err(Error::Configuration(format!(
                "integration.max_points must be >= 4, got {}",
                self.integration.max_points
            )));
        }
        if self.sampling.batch_size == 0 || self.sampling.max_rounds == 0 {
            return Err(Error::Configuration(
                "sampling.batch_size and sampling.max_rounds must be > 0".into(),
            ));
        }
        if self.sampling.scan_points == 0 {
            return Err(Error::Configuration("sampling.scan_points must be > 0".into()));
        }
        let f = self.sampling.envelope_factor;
        if !f.is_finite() || f < 1.0 {
            return Err(Error::Configuration(format!(
                "sampling.envelope_factor must be finite and >= 1, got {f}"
            )));
        }
        Ok(())
    }
}
