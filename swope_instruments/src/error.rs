//! Instrument error types
//!
//! Provides structured error types for TCS, CCD and weather operations.

use std::path::PathBuf;
use swope_imaging::{FitsError, MosaicError};
use thiserror::Error;

/// TCS link and status errors
#[derive(Debug, Clone, Error)]
pub enum TcsError {
    #[error("TCS timeout after {duration_ms}ms during {operation}")]
    Timeout { operation: String, duration_ms: u64 },

    #[error("TCS connection failed: {host} - {cause}")]
    ConnectionFailed { host: String, cause: String },

    #[error("Malformed TCS response: {0}")]
    MalformedResponse(String),

    #[error("Status field not reported: {0}")]
    MissingField(String),

    #[error("Status field {field} is {actual}, expected {expected}")]
    WrongType {
        field: String,
        expected: &'static str,
        actual: &'static str,
    },

    #[error("Command rejected: {0}")]
    CommandRejected(String),

    #[error("Invalid focus position {position}: outside {min}..={max}")]
    InvalidFocusPosition { position: i32, min: i32, max: i32 },

    #[error("Invalid rotator angle {0}")]
    InvalidAngle(f64),

    #[error("Operation not supported: {0}")]
    Unsupported(String),
}

impl TcsError {
    /// Create a timeout error with operation context
    pub fn timeout(operation: impl Into<String>, duration_ms: u64) -> Self {
        TcsError::Timeout {
            operation: operation.into(),
            duration_ms,
        }
    }

    /// Whether the same request could succeed if repeated.
    /// Nothing in this crate retries; the classification is for callers.
    pub fn is_retryable(&self) -> bool {
        match self {
            TcsError::Timeout { .. } => true,
            TcsError::ConnectionFailed { .. } => true,
            TcsError::MalformedResponse(_) => true,
            TcsError::MissingField(_) => false,
            TcsError::WrongType { .. } => false,
            TcsError::CommandRejected(_) => false,
            TcsError::InvalidFocusPosition { .. } => false,
            TcsError::InvalidAngle(_) => false,
            TcsError::Unsupported(_) => false,
        }
    }
}

/// Result type for TCS operations
pub type TcsResult<T> = Result<T, TcsError>;

/// Camera errors
#[derive(Debug, Error)]
pub enum CameraError {
    #[error(transparent)]
    Link(#[from] TcsError),

    #[error("CCD controller rejected {0}")]
    Rejected(&'static str),

    #[error("Exposure time mismatch: requested {requested}s, controller set {applied}s")]
    ExposureTimeMismatch { requested: f64, applied: f64 },

    #[error("Expected 4 quadrant files, configured {0}")]
    QuadrantCount(usize),

    #[error("Failed to read quadrant {path}: {source}")]
    Quadrant {
        path: PathBuf,
        #[source]
        source: FitsError,
    },

    #[error("Failed to write image {path}: {source}")]
    Save {
        path: PathBuf,
        #[source]
        source: FitsError,
    },

    #[error(transparent)]
    Mosaic(#[from] MosaicError),

    #[error("Readout task failed: {0}")]
    Task(String),
}

/// Weather and seeing feed errors
#[derive(Debug, Error)]
pub enum WeatherError {
    #[error("Weather request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("Invalid {kind} data: {reason}")]
    InvalidData { kind: &'static str, reason: String },

    #[error("No valid {0} measurement available")]
    NoMeasurement(&'static str),
}
