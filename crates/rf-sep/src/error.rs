//! Error types for source separation

use thiserror::Error;

/// Separation pipeline error types
#[derive(Error, Debug)]
pub enum SepError {
    /// Non-positive length, zero batch size, empty input, ...
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    /// Padded length is not a multiple of the segment length
    #[error("Inconsistent length: {samples} samples is not a multiple of segment length {segment_samples}")]
    InconsistentLength {
        samples: usize,
        segment_samples: usize,
    },

    /// Length cannot be split evenly
    #[error("{what}: {value} is not divisible by {divisor}")]
    NonDivisible {
        what: &'static str,
        value: usize,
        divisor: usize,
    },

    /// Model returned (or was given) an unexpected key set
    #[error("Key mismatch: {0}")]
    KeyMismatch(String),

    /// Batch length of a key differs from the expected item count
    #[error("Length mismatch for key '{key}': expected {expected} items, got {got}")]
    LengthMismatch {
        key: String,
        expected: usize,
        got: usize,
    },

    /// External model call failed
    #[error("Model invocation failed: {reason}")]
    ModelInvocation { reason: String },

    /// Model file not found
    #[error("Model not found: {path}")]
    ModelNotFound { path: String },

    /// Tract error
    #[error("Tract error: {0}")]
    Tract(String),

    /// Invalid tensor shape
    #[error("Invalid shape: expected {expected}, got {got}")]
    InvalidShape { expected: String, got: String },

    /// Source name not present in the configured source list
    #[error("Unknown source '{name}', available: {available:?}")]
    UnknownSource {
        name: String,
        available: Vec<String>,
    },

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON (de)serialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for separation operations
pub type SepResult<T> = Result<T, SepError>;
