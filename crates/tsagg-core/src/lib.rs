//! tsagg Core - Core types for the query-time aggregation engine
//!
//! This crate provides the building blocks shared by every aggregation layer:
//! - `FloatArray`: fixed-capacity sparse array of `f64` with a presence bitmap
//! - `FloatArrayPool`: capacity-keyed reuse pool for `FloatArray`s
//! - `SlotSelector`: absolute time slot to array index mapping
//! - `FieldType`, `FunctionType`, `AggType`: the field schema
//! - `TimeRange`, `SlotRange`: inclusive windows over time and slots
//! - `EngineConfig`: YAML-loadable engine configuration

pub mod array;
pub mod config;
pub mod error;
pub mod pool;
pub mod selector;
pub mod types;

pub use array::FloatArray;
pub use config::{AggregationSettings, EngineConfig, PoolSettings};
pub use error::{CoreError, Result};
pub use pool::FloatArrayPool;
pub use selector::{SlotPosition, SlotSelector};
pub use types::*;
