//! Core data types for the tsagg aggregation engine

use crate::error::{CoreError, Result};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Nanosecond-precision Unix epoch timestamp
pub type Timestamp = i64;

/// Discrete time bucket index within a storage family
pub type Slot = usize;

/// Identifier of a primitive field inside a user-facing field
pub type PrimitiveFieldId = u8;

/// Nanoseconds in one second
pub const ONE_SECOND_NANOS: i64 = 1_000_000_000;

/// Inclusive time range `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TimeRange {
    pub start: Timestamp,
    pub end: Timestamp,
}

impl TimeRange {
    /// Create a new time range
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self { start, end }
    }

    /// Check if a timestamp falls inside the range
    pub fn contains(&self, ts: Timestamp) -> bool {
        ts >= self.start && ts <= self.end
    }

    /// Check whether two ranges share at least one instant
    pub fn overlaps(&self, other: &TimeRange) -> bool {
        self.start <= other.end && other.start <= self.end
    }

    /// Intersection of two ranges, `None` when they are disjoint
    pub fn intersect(&self, other: &TimeRange) -> Option<TimeRange> {
        if !self.overlaps(other) {
            return None;
        }
        Some(TimeRange {
            start: self.start.max(other.start),
            end: self.end.min(other.end),
        })
    }

    /// True when start > end
    pub fn is_empty(&self) -> bool {
        self.start > self.end
    }
}

/// Inclusive slot range `[start, end]`
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SlotRange {
    pub start: Slot,
    pub end: Slot,
}

impl SlotRange {
    /// Create a slot range, rejecting `start > end`
    pub fn new(start: Slot, end: Slot) -> Result<Self> {
        if start > end {
            return Err(CoreError::InvalidSlotRange { start, end });
        }
        Ok(Self { start, end })
    }

    /// Number of slots covered by the range
    pub fn len(&self) -> usize {
        self.end - self.start + 1
    }

    /// A slot range always covers at least one slot
    pub fn is_empty(&self) -> bool {
        false
    }
}

/// How values written to the same slot are merged
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum AggType {
    Sum,
    /// Sums pre-counted values
    Count,
    Min,
    Max,
    /// Gauge semantics, the newest value replaces the old one
    Last,
    /// Keeps the first value written
    First,
}

/// Query functions that can be applied to a field
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum FunctionType {
    Sum,
    Count,
    Min,
    Max,
    Avg,
    Last,
    First,
    Stddev,
    Rate,
    Quantile,
}

impl FunctionType {
    /// Parse from string
    pub fn from_name(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "sum" => Some(FunctionType::Sum),
            "count" => Some(FunctionType::Count),
            "min" => Some(FunctionType::Min),
            "max" => Some(FunctionType::Max),
            "avg" | "mean" => Some(FunctionType::Avg),
            "last" => Some(FunctionType::Last),
            "first" => Some(FunctionType::First),
            "stddev" => Some(FunctionType::Stddev),
            "rate" => Some(FunctionType::Rate),
            "quantile" => Some(FunctionType::Quantile),
            _ => None,
        }
    }

    /// Lower-case function name as written in a query
    pub fn name(&self) -> &'static str {
        match self {
            FunctionType::Sum => "sum",
            FunctionType::Count => "count",
            FunctionType::Min => "min",
            FunctionType::Max => "max",
            FunctionType::Avg => "avg",
            FunctionType::Last => "last",
            FunctionType::First => "first",
            FunctionType::Stddev => "stddev",
            FunctionType::Rate => "rate",
            FunctionType::Quantile => "quantile",
        }
    }
}

impl fmt::Display for FunctionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Primitive field ids of a summary field
pub const SUMMARY_SUM: PrimitiveFieldId = 1;
pub const SUMMARY_COUNT: PrimitiveFieldId = 2;
pub const SUMMARY_MIN: PrimitiveFieldId = 3;
pub const SUMMARY_MAX: PrimitiveFieldId = 4;

/// Name prefix of histogram bucket fields, followed by the bucket upper bound
pub const HISTOGRAM_BUCKET_PREFIX: &str = "__bucket_";

/// User-facing field types; each decomposes into one or more primitive fields
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// Counter, merged by addition
    Sum,
    Min,
    Max,
    /// Gauge, merged by replacement
    Last,
    First,
    /// Sum, count, min and max of observations
    Summary,
    /// One cumulative-count bucket of a histogram
    Histogram,
}

const SUM_FIELD: &[(PrimitiveFieldId, AggType)] = &[(1, AggType::Sum)];
const MIN_FIELD: &[(PrimitiveFieldId, AggType)] = &[(1, AggType::Min)];
const MAX_FIELD: &[(PrimitiveFieldId, AggType)] = &[(1, AggType::Max)];
const LAST_FIELD: &[(PrimitiveFieldId, AggType)] = &[(1, AggType::Last)];
const FIRST_FIELD: &[(PrimitiveFieldId, AggType)] = &[(1, AggType::First)];
const SUMMARY_SUM_FIELD: &[(PrimitiveFieldId, AggType)] = &[(SUMMARY_SUM, AggType::Sum)];
const SUMMARY_COUNT_FIELD: &[(PrimitiveFieldId, AggType)] = &[(SUMMARY_COUNT, AggType::Count)];
const SUMMARY_MIN_FIELD: &[(PrimitiveFieldId, AggType)] = &[(SUMMARY_MIN, AggType::Min)];
const SUMMARY_MAX_FIELD: &[(PrimitiveFieldId, AggType)] = &[(SUMMARY_MAX, AggType::Max)];
const SUMMARY_AVG_FIELD: &[(PrimitiveFieldId, AggType)] =
    &[(SUMMARY_SUM, AggType::Sum), (SUMMARY_COUNT, AggType::Count)];
const SUMMARY_ALL: &[(PrimitiveFieldId, AggType)] = &[
    (SUMMARY_SUM, AggType::Sum),
    (SUMMARY_COUNT, AggType::Count),
    (SUMMARY_MIN, AggType::Min),
    (SUMMARY_MAX, AggType::Max),
];

impl FieldType {
    /// Function applied when the field is referenced without a function call
    pub fn default_function(&self) -> FunctionType {
        match self {
            FieldType::Sum => FunctionType::Sum,
            FieldType::Min => FunctionType::Min,
            FieldType::Max => FunctionType::Max,
            FieldType::Last => FunctionType::Last,
            FieldType::First => FunctionType::First,
            FieldType::Summary => FunctionType::Avg,
            FieldType::Histogram => FunctionType::Sum,
        }
    }

    /// Primitive fields that must be materialized to answer `func`.
    ///
    /// Returns `None` when the field type does not support the function.
    pub fn primitive_fields(&self, func: FunctionType) -> Option<&'static [(PrimitiveFieldId, AggType)]> {
        match (self, func) {
            (FieldType::Sum, FunctionType::Sum | FunctionType::Rate) => Some(SUM_FIELD),
            (FieldType::Sum, FunctionType::Min) => Some(MIN_FIELD),
            (FieldType::Sum, FunctionType::Max) => Some(MAX_FIELD),
            (FieldType::Min, FunctionType::Min) => Some(MIN_FIELD),
            (FieldType::Max, FunctionType::Max) => Some(MAX_FIELD),
            (FieldType::Last, FunctionType::Last) => Some(LAST_FIELD),
            (FieldType::Last, FunctionType::Sum) => Some(SUM_FIELD),
            (FieldType::Last, FunctionType::Min) => Some(MIN_FIELD),
            (FieldType::Last, FunctionType::Max) => Some(MAX_FIELD),
            (FieldType::First, FunctionType::First) => Some(FIRST_FIELD),
            (FieldType::Summary, FunctionType::Sum) => Some(SUMMARY_SUM_FIELD),
            (FieldType::Summary, FunctionType::Count) => Some(SUMMARY_COUNT_FIELD),
            (FieldType::Summary, FunctionType::Min) => Some(SUMMARY_MIN_FIELD),
            (FieldType::Summary, FunctionType::Max) => Some(SUMMARY_MAX_FIELD),
            (FieldType::Summary, FunctionType::Avg) => Some(SUMMARY_AVG_FIELD),
            (FieldType::Histogram, FunctionType::Sum | FunctionType::Quantile) => Some(SUM_FIELD),
            _ => None,
        }
    }

    /// Primitive fields materialized for a bare field reference
    pub fn default_primitive_fields(&self) -> &'static [(PrimitiveFieldId, AggType)] {
        self.primitive_fields(self.default_function()).unwrap_or(&[])
    }

    /// Every primitive field the storage layer keeps for this type, ordered by id
    pub fn schema(&self) -> &'static [(PrimitiveFieldId, AggType)] {
        match self {
            FieldType::Summary => SUMMARY_ALL,
            _ => self.default_primitive_fields(),
        }
    }

    /// Check whether `func` may be applied to this field type
    pub fn is_supported(&self, func: FunctionType) -> bool {
        self.primitive_fields(func).is_some()
    }
}

/// Parse the upper bound out of a histogram bucket field name (`__bucket_<upper>`)
pub fn histogram_upper_bound(field_name: &str) -> Option<f64> {
    let bound = field_name.strip_prefix(HISTOGRAM_BUCKET_PREFIX)?;
    match bound {
        "+Inf" | "inf" | "Inf" => Some(f64::INFINITY),
        _ => bound.parse::<f64>().ok(),
    }
}
