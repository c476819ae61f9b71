//! Error types for tsagg-core

use thiserror::Error;

/// Core error types
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Invalid slot range: start {start} > end {end}")]
    InvalidSlotRange { start: usize, end: usize },

    #[error("Invalid interval ratio: {0}")]
    InvalidRatio(usize),

    #[error("Invalid quantile: {0}, must be within [0, 1]")]
    InvalidQuantile(f64),

    #[error("Not enough histogram buckets: got {0}, need at least 2")]
    NotEnoughBuckets(usize),

    #[error("Histogram bucket length mismatch: expected {expected}, got {actual}")]
    BucketLengthMismatch { expected: usize, actual: usize },

    #[error("Invalid float array: {0}")]
    InvalidArray(String),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;

impl From<serde_yaml::Error> for CoreError {
    fn from(e: serde_yaml::Error) -> Self {
        CoreError::Configuration(e.to_string())
    }
}
