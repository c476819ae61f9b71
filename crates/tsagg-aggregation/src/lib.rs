//! tsagg Aggregation - Aggregators for query-time time series aggregation
//!
//! This crate provides:
//! - The aggregate function library (reducers, avg, rate, quantile, binary arithmetic)
//! - Primitive and field aggregators (incremental and down-sampling variants)
//! - The down-sampling merge algorithm
//! - Series, segment and grouping aggregators
//!
//! Aggregators are not safe for concurrent mutation; give every worker its
//! own aggregator chain.

pub mod downsample;
pub mod error;
pub mod field;
pub mod functions;
pub mod grouping;
pub mod iterator;
pub mod primitive;
pub mod series;
pub mod spec;

pub use downsample::{down_sampling_into, ArraySink, SlotSink, ValueGetter};
pub use error::{AggregationError, Result};
pub use field::{AggregatorFactory, DownSamplingFieldAggregator, FieldAggregator, IncrementalFieldAggregator};
pub use functions::BinaryOp;
pub use grouping::{FieldAggregates, GroupingAggregator};
pub use iterator::{
    FieldIterator, FieldSeriesIterator, MemoryFieldIterator, MemoryFieldSeries, MemoryPrimitiveIterator,
    MemorySeries, PrimitiveIterator, SeriesIterator,
};
pub use primitive::PrimitiveAggregator;
pub use series::{SeriesAggregator, SeriesPoint, TimeSpec};
pub use spec::{AggregatorSpec, AggregatorSpecs};
