//! Aggregate query model

use crate::error::{QueryError, Result};
use crate::expr::Expr;
use crate::order::{OrderByItem, OrderByRow};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use tsagg_aggregation::{AggregatorSpec, AggregatorSpecs, SeriesPoint, TimeSpec};
use tsagg_core::{FloatArray, FunctionType, PrimitiveFieldId, SlotRange, TimeRange, Timestamp};

/// An aggregate query over a set of series
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregateQuery {
    /// Time range, storage interval, interval ratio and family duration
    pub time: TimeSpec,
    /// Fields to aggregate
    pub specs: AggregatorSpecs,
    /// Select items evaluated per group
    pub select_items: Vec<Expr>,
    /// Ordering; rows keep group order when empty
    pub order_by: Vec<OrderByItem>,
    /// Maximum number of rows
    pub limit: Option<usize>,
}

impl AggregateQuery {
    /// Create a query builder
    pub fn builder(start: Timestamp, end: Timestamp) -> AggregateQueryBuilder {
        AggregateQueryBuilder::new(start, end)
    }

    /// Validate the query
    pub fn validate(&self) -> Result<()> {
        let range = self.time.query_range;
        if range.is_empty() {
            return Err(QueryError::InvalidTimeRange {
                start: range.start,
                end: range.end,
            });
        }
        self.time.validate()?;
        if self.select_items.is_empty() {
            return Err(QueryError::InvalidQuery("No select items".to_string()));
        }
        if self.specs.is_empty() {
            return Err(QueryError::InvalidQuery("No fields to aggregate".to_string()));
        }
        self.specs.validate()?;
        Ok(())
    }

    /// Number of points of every result vector
    pub fn point_count(&self) -> usize {
        self.time.point_count()
    }
}

/// Builder for aggregate queries
#[derive(Debug, Clone)]
pub struct AggregateQueryBuilder {
    range: TimeRange,
    interval: i64,
    interval_ratio: usize,
    family_duration: i64,
    specs: Vec<AggregatorSpec>,
    select_items: Vec<Expr>,
    order_by: Vec<OrderByItem>,
    limit: Option<usize>,
}

impl AggregateQueryBuilder {
    /// Create a builder for an inclusive time range, 1s slots in 1h families by default
    pub fn new(start: Timestamp, end: Timestamp) -> Self {
        Self {
            range: TimeRange::new(start, end),
            interval: tsagg_core::ONE_SECOND_NANOS,
            interval_ratio: 1,
            family_duration: 3600 * tsagg_core::ONE_SECOND_NANOS,
            specs: Vec::new(),
            select_items: Vec::new(),
            order_by: Vec::new(),
            limit: None,
        }
    }

    /// Storage interval in nanoseconds
    pub fn interval(mut self, interval: i64) -> Self {
        self.interval = interval;
        self
    }

    /// Storage slots per query point
    pub fn interval_ratio(mut self, ratio: usize) -> Self {
        self.interval_ratio = ratio;
        self
    }

    /// Family duration in nanoseconds
    pub fn family_duration(mut self, duration: i64) -> Self {
        self.family_duration = duration;
        self
    }

    /// Aggregate a field
    pub fn field(mut self, spec: AggregatorSpec) -> Self {
        self.specs.push(spec);
        self
    }

    /// Add a select item; bare expressions are wrapped into an un-aliased select item
    pub fn select(mut self, expr: Expr) -> Self {
        let item = match expr {
            item @ Expr::SelectItem { .. } => item,
            expr => Expr::select(expr),
        };
        self.select_items.push(item);
        self
    }

    /// Order by a statistic of a result
    pub fn order_by(mut self, field: impl Into<String>, function: FunctionType, ascending: bool) -> Self {
        self.order_by.push(OrderByItem {
            field: field.into(),
            function,
            ascending,
        });
        self
    }

    /// Limit results
    pub fn limit(mut self, limit: usize) -> Self {
        self.limit = Some(limit);
        self
    }

    /// Build and validate the query.
    ///
    /// The start of a non-empty range is truncated to the query interval grid.
    pub fn build(self) -> Result<AggregateQuery> {
        let mut time = TimeSpec::new(self.range, self.interval, self.interval_ratio, self.family_duration);
        if !self.range.is_empty() {
            time = time.align_start();
        }
        let query = AggregateQuery {
            time,
            specs: AggregatorSpecs::new(self.specs),
            select_items: self.select_items,
            order_by: self.order_by,
            limit: self.limit,
        };
        query.validate()?;
        Ok(query)
    }
}

/// A single row in query results
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResultRow {
    /// Tag-value string of the group
    pub tags: String,
    /// Result vectors by alias or expression text
    pub fields: BTreeMap<String, FloatArray>,
}

impl From<OrderByRow> for ResultRow {
    fn from(row: OrderByRow) -> Self {
        let (tags, fields) = row.into_parts();
        Self { tags, fields }
    }
}

/// Query result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QueryResult {
    /// Result rows
    pub rows: Vec<ResultRow>,
    /// Points per result vector
    pub point_count: usize,
    /// Number of groups before ordering and limiting
    pub total_groups: usize,
    /// Execution time in nanoseconds
    pub execution_time_ns: u64,
}

impl QueryResult {
    /// Create an empty result
    pub fn empty(point_count: usize) -> Self {
        Self {
            rows: Vec::new(),
            point_count,
            total_groups: 0,
            execution_time_ns: 0,
        }
    }

    /// Check if result is empty
    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Get number of rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// A rollup job re-aggregating decoded storage streams into coarser slots
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupJob {
    /// Source interval, interval ratio of the target and family duration
    pub time: TimeSpec,
    /// Fields to roll up, in schema order
    pub specs: AggregatorSpecs,
}

impl RollupJob {
    /// Create a job; the start of a non-empty range is truncated to the target grid
    pub fn new(time: TimeSpec, specs: Vec<AggregatorSpec>) -> Self {
        let time = if time.query_range.is_empty() {
            time
        } else {
            time.align_start()
        };
        Self {
            time,
            specs: AggregatorSpecs::in_schema_order(specs),
        }
    }

    /// Validate the job
    pub fn validate(&self) -> Result<()> {
        let range = self.time.query_range;
        if range.is_empty() {
            return Err(QueryError::InvalidTimeRange {
                start: range.start,
                end: range.end,
            });
        }
        self.time.validate()?;
        if self.specs.is_empty() {
            return Err(QueryError::InvalidQuery("No fields to roll up".to_string()));
        }
        self.specs.validate()?;
        Ok(())
    }
}

/// Decoded source streams of one primitive field within one family
#[derive(Debug, Clone, PartialEq)]
pub struct RollupInput {
    pub tags: String,
    pub field_name: String,
    pub family_time: Timestamp,
    pub field_id: PrimitiveFieldId,
    /// Source slots covered by the streams
    pub source: SlotRange,
    /// One entry per source segment; `None` when a segment has no data
    pub streams: Vec<Option<FloatArray>>,
}

/// Rolled-up points of one field of one group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RollupRow {
    pub tags: String,
    pub field_name: String,
    /// Points at the start time of each target slot
    pub points: Vec<SeriesPoint>,
}

/// Rollup result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollupResult {
    /// Rows in tag then schema order
    pub rows: Vec<RollupRow>,
    /// Number of groups
    pub total_groups: usize,
    /// Execution time in nanoseconds
    pub execution_time_ns: u64,
}
