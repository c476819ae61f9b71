//! Primitive aggregator
//!
//! Accumulates the samples of one primitive field into one sparse array
//! using one aggregate type.

use crate::downsample::SlotSink;
use crate::functions::reduce;
use std::fmt;
use std::sync::Arc;
use tsagg_core::{AggType, FloatArray, FloatArrayPool, PrimitiveFieldId, Slot, SlotPosition, SlotSelector};

/// Aggregates one primitive field into a lazily allocated [`FloatArray`]
pub struct PrimitiveAggregator {
    field_id: PrimitiveFieldId,
    agg_type: AggType,
    selector: SlotSelector,
    values: Option<FloatArray>,
    pool: Arc<FloatArrayPool>,
}

impl PrimitiveAggregator {
    /// Create an aggregator whose array is drawn from `pool` on first write
    pub fn new(field_id: PrimitiveFieldId, agg_type: AggType, selector: SlotSelector, pool: Arc<FloatArrayPool>) -> Self {
        Self {
            field_id,
            agg_type,
            selector,
            values: None,
            pool,
        }
    }

    pub fn field_id(&self) -> PrimitiveFieldId {
        self.field_id
    }

    pub fn agg_type(&self) -> AggType {
        self.agg_type
    }

    /// Sort key used for deterministic result ordering
    pub fn key(&self) -> (PrimitiveFieldId, AggType) {
        (self.field_id, self.agg_type)
    }

    pub fn point_count(&self) -> usize {
        self.selector.point_count()
    }

    pub fn selector(&self) -> &SlotSelector {
        &self.selector
    }

    /// Merge `value` at array index `idx`.
    ///
    /// Returns `true` once `idx` is past the point count: nothing is written
    /// and callers should stop feeding this series.
    pub fn aggregate(&mut self, idx: usize, value: f64) -> bool {
        let point_count = self.selector.point_count();
        if idx >= point_count {
            return true;
        }
        let pool = &self.pool;
        let values = self.values.get_or_insert_with(|| pool.acquire(point_count));
        match values.value(idx) {
            Some(current) => values.set_value(idx, reduce(self.agg_type, current, value)),
            None => values.set_value(idx, value),
        }
        false
    }

    /// Merge `value` at an absolute slot, mapped through the selector.
    ///
    /// Slots before the window are ignored; slots after it report completion.
    pub fn aggregate_slot(&mut self, slot: Slot, value: f64) -> bool {
        match self.selector.index_of(slot) {
            SlotPosition::Before => false,
            SlotPosition::Index(idx) => self.aggregate(idx, value),
            SlotPosition::Completed => true,
        }
    }

    /// Aggregated values, `None` until the first write
    pub fn values(&self) -> Option<&FloatArray> {
        self.values.as_ref()
    }

    /// `(slot, value)` pairs, slots translated back to absolute slots
    pub fn iter(&self) -> impl Iterator<Item = (Slot, f64)> + '_ {
        let selector = self.selector;
        self.values
            .iter()
            .flat_map(|values| values.iter())
            .map(move |(idx, v)| (selector.slot_of(idx), v))
    }

    /// Clear the values in place for reuse; the capacity stays the same
    pub fn reset(&mut self) {
        if let Some(values) = self.values.as_mut() {
            values.reset();
        }
    }

    /// Sink writing one target slot per call, starting at index 0
    pub fn sink(&mut self) -> PrimitiveSink<'_> {
        PrimitiveSink { aggregator: self, pos: 0 }
    }
}

impl Drop for PrimitiveAggregator {
    fn drop(&mut self) {
        if let Some(values) = self.values.take() {
            self.pool.release(values);
        }
    }
}

impl fmt::Debug for PrimitiveAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrimitiveAggregator")
            .field("field_id", &self.field_id)
            .field("agg_type", &self.agg_type)
            .field("selector", &self.selector)
            .field("values", &self.values)
            .finish()
    }
}

/// Sequential down-sampling sink into a primitive aggregator
pub struct PrimitiveSink<'a> {
    aggregator: &'a mut PrimitiveAggregator,
    pos: usize,
}

impl SlotSink for PrimitiveSink<'_> {
    fn write(&mut self, has_value: bool, value: f64) {
        if has_value {
            self.aggregator.aggregate(self.pos, value);
        }
        self.pos += 1;
    }
}
