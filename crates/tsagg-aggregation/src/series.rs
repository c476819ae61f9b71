//! Series aggregator
//!
//! Holds one field aggregator per storage family for one logical field
//! across the whole query time range.

use crate::downsample::ValueGetter;
use crate::error::{AggregationError, Result};
use crate::field::{AggregatorFactory, FieldAggregator};
use crate::iterator::FieldIterator;
use crate::spec::AggregatorSpec;
use serde::{Deserialize, Serialize};
use std::fmt;
use tsagg_core::{AggType, FieldType, PrimitiveFieldId, SlotRange, SlotSelector, TimeRange, Timestamp};

/// Time layout of a query: range, storage interval, ratio and family size
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeSpec {
    /// Inclusive query time range
    pub query_range: TimeRange,
    /// Storage interval of one slot, in nanoseconds
    pub interval: i64,
    /// Storage slots merged into one query point
    pub interval_ratio: usize,
    /// Duration of one storage family, in nanoseconds
    pub family_duration: i64,
}

impl TimeSpec {
    pub fn new(query_range: TimeRange, interval: i64, interval_ratio: usize, family_duration: i64) -> Self {
        Self {
            query_range,
            interval,
            interval_ratio,
            family_duration,
        }
    }

    /// Reject layouts the slot arithmetic cannot handle
    pub fn validate(&self) -> Result<()> {
        if self.query_range.is_empty() {
            return Err(AggregationError::InvalidDefinition(format!(
                "Invalid time range: start {} > end {}",
                self.query_range.start, self.query_range.end
            )));
        }
        if self.interval <= 0 || self.interval_ratio == 0 {
            return Err(AggregationError::InvalidDefinition(format!(
                "Invalid interval {} with ratio {}",
                self.interval, self.interval_ratio
            )));
        }
        if self.family_duration <= 0 || self.family_duration % self.query_interval() != 0 {
            return Err(AggregationError::InvalidDefinition(format!(
                "Family duration {} is not a multiple of the query interval {}",
                self.family_duration,
                self.query_interval()
            )));
        }
        if self.query_range.start.rem_euclid(self.query_interval()) != 0 {
            return Err(AggregationError::InvalidDefinition(format!(
                "Query start {} is not aligned to the query interval {}",
                self.query_range.start,
                self.query_interval()
            )));
        }
        Ok(())
    }

    /// Truncate the query start down to the query interval grid.
    ///
    /// Layouts with a non-positive query interval are returned unchanged.
    pub fn align_start(mut self) -> Self {
        let query_interval = self.query_interval();
        if query_interval > 0 {
            self.query_range.start -= self.query_range.start.rem_euclid(query_interval);
        }
        self
    }

    /// Duration of one query point, in nanoseconds
    pub fn query_interval(&self) -> i64 {
        self.interval * self.interval_ratio as i64
    }

    /// Number of points of the query result
    pub fn point_count(&self) -> usize {
        ((self.query_range.end - self.query_range.start) / self.query_interval() + 1) as usize
    }

    /// Result index of an absolute timestamp, `None` outside the query range
    pub fn point_index(&self, ts: Timestamp) -> Option<usize> {
        if !self.query_range.contains(ts) {
            return None;
        }
        Some(((ts - self.query_range.start) / self.query_interval()) as usize)
    }

    /// Start time of the family containing `ts`
    pub fn family_of(&self, ts: Timestamp) -> Timestamp {
        ts - ts.rem_euclid(self.family_duration)
    }

    /// Natural time range of the family starting at `family_time`
    pub fn family_range(&self, family_time: Timestamp) -> TimeRange {
        TimeRange::new(family_time, family_time + self.family_duration - 1)
    }

    /// Slot selector of a family clipped to the query range, `None` when disjoint
    pub fn family_selector(&self, family_time: Timestamp) -> Option<SlotSelector> {
        let clipped = self.query_range.intersect(&self.family_range(family_time))?;
        let start = ((clipped.start - family_time) / self.interval) as usize;
        let end = ((clipped.end - family_time) / self.interval) as usize;
        SlotSelector::new(start, end, self.interval_ratio).ok()
    }

    /// Timestamp of a slot inside a family
    pub fn slot_time(&self, family_time: Timestamp, slot: usize) -> Timestamp {
        family_time + slot as i64 * self.interval
    }
}

/// Per-family field aggregators of one field
pub struct SeriesAggregator {
    spec: AggregatorSpec,
    field_type: FieldType,
    time: TimeSpec,
    series_start: Timestamp,
    blocks: Vec<Option<Box<dyn FieldAggregator>>>,
    factory: AggregatorFactory,
}

impl SeriesAggregator {
    pub fn new(spec: AggregatorSpec, time: TimeSpec, factory: AggregatorFactory) -> Self {
        let series_start = time.family_of(time.query_range.start);
        let series_end = time.family_of(time.query_range.end);
        let family_count = ((series_end - series_start) / time.family_duration + 1) as usize;
        let field_type = spec.field_type;
        Self {
            spec,
            field_type,
            time,
            series_start,
            blocks: (0..family_count).map(|_| None).collect(),
            factory,
        }
    }

    pub fn field_name(&self) -> &str {
        &self.spec.field_name
    }

    pub fn spec(&self) -> &AggregatorSpec {
        &self.spec
    }

    pub fn time_spec(&self) -> &TimeSpec {
        &self.time
    }

    /// Field type observed on the data, defaulting to the aggregator spec's type
    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn set_field_type(&mut self, field_type: FieldType) {
        self.field_type = field_type;
    }

    /// Field aggregator of the family starting at `family_time`, created on first use.
    ///
    /// `None` when the family precedes the series start or lies outside the query range.
    pub fn get_aggregate_block(&mut self, family_time: Timestamp) -> Option<&mut dyn FieldAggregator> {
        if family_time < self.series_start {
            return None;
        }
        let idx = ((family_time - self.series_start) / self.time.family_duration) as usize;
        if idx >= self.blocks.len() {
            return None;
        }
        if self.blocks[idx].is_none() {
            let selector = self.time.family_selector(family_time)?;
            tracing::debug!(
                "Creating aggregate block for field {} at family {} (slots {}..={})",
                self.spec.field_name,
                family_time,
                selector.start(),
                selector.end()
            );
            self.blocks[idx] = Some((self.factory)(&self.spec, selector));
        }
        let block: &mut dyn FieldAggregator = self.blocks[idx].as_mut()?.as_mut();
        Some(block)
    }

    /// Feed one family's field iterator
    pub fn aggregate(&mut self, family_time: Timestamp, it: &mut dyn FieldIterator) {
        if let Some(block) = self.get_aggregate_block(family_time) {
            block.aggregate(it);
        }
    }

    /// Down-sample the decoded streams of primitive `field_id` into one family's block.
    ///
    /// Returns `Ok(false)` when the family lies outside the query range or its
    /// block does not down-sample.
    pub fn down_sample(
        &mut self,
        family_time: Timestamp,
        source: SlotRange,
        field_id: PrimitiveFieldId,
        streams: &[Option<&dyn ValueGetter>],
    ) -> Result<bool> {
        let field_name = self.spec.field_name.clone();
        let Some(block) = self.get_aggregate_block(family_time) else {
            return Ok(false);
        };
        match block.as_down_sampling() {
            Some(down_sampling) => {
                down_sampling.down_sample(source, field_id, streams)?;
                Ok(true)
            }
            None => {
                tracing::warn!("Block of field {} at family {} does not down-sample", field_name, family_time);
                Ok(false)
            }
        }
    }

    /// Created blocks as `(family_time, aggregator)` in ascending family order
    pub fn iter(&self) -> impl Iterator<Item = (Timestamp, &dyn FieldAggregator)> + '_ {
        let start = self.series_start;
        let duration = self.time.family_duration;
        self.blocks.iter().enumerate().filter_map(move |(idx, block)| {
            block
                .as_deref()
                .map(|block| (start + idx as i64 * duration, block as &dyn FieldAggregator))
        })
    }

    /// Flattened `(timestamp, primitive_field_id, agg_type, value)` points of every family
    pub fn points(&self) -> impl Iterator<Item = SeriesPoint> + '_ {
        let time = self.time;
        self.iter().flat_map(move |(family_time, block)| {
            block.results().into_iter().flat_map(move |primitive| {
                let key = primitive.key();
                primitive
                    .iter()
                    .map(move |(slot, value)| SeriesPoint {
                        timestamp: time.slot_time(family_time, block.source_slot(slot)),
                        field_id: key.0,
                        agg_type: key.1,
                        value,
                    })
                    .collect::<Vec<_>>()
            })
        })
    }

    /// Reset every created block
    pub fn reset(&mut self) {
        self.blocks.iter_mut().flatten().for_each(|block| block.reset());
    }
}

/// One aggregated value of a series
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SeriesPoint {
    pub timestamp: Timestamp,
    pub field_id: PrimitiveFieldId,
    pub agg_type: AggType,
    pub value: f64,
}

impl fmt::Debug for SeriesAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SeriesAggregator")
            .field("spec", &self.spec)
            .field("field_type", &self.field_type)
            .field("series_start", &self.series_start)
            .field("blocks", &self.blocks)
            .finish()
    }
}
