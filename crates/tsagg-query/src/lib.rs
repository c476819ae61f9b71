//! tsagg Query - Evaluation and ordering of aggregated time series
//!
//! This crate provides:
//! - Select expression trees
//! - Prepared field stores exposing per-function values
//! - Expression evaluation over prepared fields
//! - Order-by statistics, top-N selection and result limiting
//! - The aggregate query model and executor
//! - Rollup jobs down-sampling decoded storage streams

pub mod error;
pub mod evaluator;
pub mod executor;
pub mod expr;
pub mod field;
pub mod model;
pub mod order;

pub use error::{QueryError, Result};
pub use evaluator::{ExpressionEvaluator, Operand};
pub use executor::AggregateExecutor;
pub use expr::{BinaryOp, Expr};
pub use field::{FieldStore, PreparedField};
pub use model::{
    AggregateQuery, AggregateQueryBuilder, QueryResult, ResultRow, RollupInput, RollupJob, RollupResult, RollupRow,
};
pub use order::{FieldStats, OrderByItem, OrderByRow, ResultLimiter, TopNHeap};
