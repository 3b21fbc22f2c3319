//! Error types for convfit

use thiserror::Error;

/// convfit error type
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON parsing error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// Invalid configuration (interpolation spec, duplicate names, over-specified inputs).
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Internally inconsistent state, e.g. a floating parameter over immutable storage.
    #[error("Consistency error: {0}")]
    Consistency(String),

    /// A computation that cannot proceed safely, e.g. CDF differencing at infinity.
    #[error("Numerical instability: {0}")]
    NumericalInstability(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Computation error
    #[error("Computation error: {0}")]
    Computation(String),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
