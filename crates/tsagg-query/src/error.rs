//! Query error types

use thiserror::Error;
use tsagg_aggregation::AggregationError;
use tsagg_core::CoreError;

/// Query errors
#[derive(Debug, Error)]
pub enum QueryError {
    #[error("Invalid query: {0}")]
    InvalidQuery(String),

    #[error("Invalid time range: start {start} > end {end}")]
    InvalidTimeRange { start: i64, end: i64 },

    #[error("Aggregation error: {0}")]
    Aggregation(#[from] AggregationError),

    #[error("Core error: {0}")]
    Core(#[from] CoreError),
}

/// Result type for query operations
pub type Result<T> = std::result::Result<T, QueryError>;
