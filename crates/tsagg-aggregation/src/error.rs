//! Aggregation error types

use thiserror::Error;
use tsagg_core::CoreError;

/// Aggregation errors
#[derive(Debug, Error)]
pub enum AggregationError {
    #[error("Invalid aggregator definition: {0}")]
    InvalidDefinition(String),

    #[error("Unsupported function {function} for field {field}")]
    UnsupportedFunction { field: String, function: String },

    #[error(transparent)]
    Core(#[from] CoreError),
}

/// Result type for aggregation operations
pub type Result<T> = std::result::Result<T, AggregationError>;
