//! Field aggregators
//!
//! A field aggregator owns the primitive aggregators of one field inside one
//! storage family. Queries use [`IncrementalFieldAggregator`], which creates
//! primitives on demand while consuming a [`FieldIterator`]. Rollup jobs use
//! [`DownSamplingFieldAggregator`], which pre-creates every primitive from
//! the aggregator spec and is written to through [`down_sampling_into`].

use crate::downsample::{down_sampling_into, ValueGetter};
use crate::error::Result;
use crate::iterator::FieldIterator;
use crate::primitive::PrimitiveAggregator;
use crate::spec::AggregatorSpec;
use std::fmt;
use std::sync::Arc;
use tsagg_core::{AggType, FloatArrayPool, PrimitiveFieldId, Slot, SlotRange, SlotSelector};

/// Creates the field aggregator of one family from its clipped slot selector
pub type AggregatorFactory = Arc<dyn Fn(&AggregatorSpec, SlotSelector) -> Box<dyn FieldAggregator> + Send + Sync>;

/// Aggregates all primitive fields of one field within one family
pub trait FieldAggregator: fmt::Debug {
    /// Consume every primitive sub-iterator of `it`
    fn aggregate(&mut self, it: &mut dyn FieldIterator);

    /// Primitive aggregators ordered by `(primitive_field_id, agg_type)`
    fn results(&self) -> Vec<&PrimitiveAggregator>;

    /// Slot window of this family
    fn selector(&self) -> &SlotSelector;

    /// Clear every primitive for reuse
    fn reset(&mut self);

    /// First source slot covered by result slot `slot`
    fn source_slot(&self, slot: Slot) -> Slot {
        slot
    }

    /// Down-sampling access, `None` for query aggregators
    fn as_down_sampling(&mut self) -> Option<&mut DownSamplingFieldAggregator> {
        None
    }
}

/// Query-time field aggregator creating primitives lazily per key.
///
/// With requested keys, each incoming primitive stream feeds every key with
/// the same primitive field id, reduced with that key's agg type; streams of
/// other field ids are skipped. Without requested keys the stream's own key
/// is used.
pub struct IncrementalFieldAggregator {
    selector: SlotSelector,
    pool: Arc<FloatArrayPool>,
    keys: Vec<(PrimitiveFieldId, AggType)>,
    // insertion order; sorted when results are requested
    primitives: Vec<PrimitiveAggregator>,
}

impl IncrementalFieldAggregator {
    pub fn new(selector: SlotSelector, pool: Arc<FloatArrayPool>) -> Self {
        Self::with_keys(selector, Vec::new(), pool)
    }

    /// Aggregator materializing only `keys`
    pub fn with_keys(selector: SlotSelector, keys: Vec<(PrimitiveFieldId, AggType)>, pool: Arc<FloatArrayPool>) -> Self {
        Self {
            selector,
            pool,
            keys,
            primitives: Vec::new(),
        }
    }

    /// Factory building incremental aggregators for the spec's primitive keys, backed by `pool`
    pub fn factory(pool: Arc<FloatArrayPool>) -> AggregatorFactory {
        Arc::new(move |spec: &AggregatorSpec, selector: SlotSelector| {
            Box::new(IncrementalFieldAggregator::with_keys(selector, spec.primitive_keys(), Arc::clone(&pool)))
                as Box<dyn FieldAggregator>
        })
    }

    fn get_or_create(&mut self, field_id: PrimitiveFieldId, agg_type: AggType) -> usize {
        match self.primitives.iter().position(|p| p.key() == (field_id, agg_type)) {
            Some(pos) => pos,
            None => {
                self.primitives.push(PrimitiveAggregator::new(
                    field_id,
                    agg_type,
                    self.selector,
                    Arc::clone(&self.pool),
                ));
                self.primitives.len() - 1
            }
        }
    }

    /// Primitive indexes fed by a stream of `(field_id, agg_type)`
    fn targets(&mut self, field_id: PrimitiveFieldId, agg_type: AggType) -> Vec<usize> {
        if self.keys.is_empty() {
            return vec![self.get_or_create(field_id, agg_type)];
        }
        let keys: Vec<(PrimitiveFieldId, AggType)> =
            self.keys.iter().copied().filter(|(id, _)| *id == field_id).collect();
        keys.into_iter()
            .map(|(id, agg_type)| self.get_or_create(id, agg_type))
            .collect()
    }
}

impl FieldAggregator for IncrementalFieldAggregator {
    fn aggregate(&mut self, it: &mut dyn FieldIterator) {
        while let Some(mut primitive_it) = it.next_primitive() {
            let field_id = primitive_it.field_id();
            let targets = self.targets(field_id, primitive_it.agg_type());
            if targets.is_empty() {
                tracing::trace!("Skipping unrequested primitive field {}", field_id);
                continue;
            }
            'points: while let Some((slot, value)) = primitive_it.next_point() {
                for &idx in &targets {
                    if self.primitives[idx].aggregate_slot(slot, value) {
                        tracing::trace!("Primitive field {} completed at slot {}", field_id, slot);
                        break 'points;
                    }
                }
            }
        }
    }

    fn results(&self) -> Vec<&PrimitiveAggregator> {
        let mut results: Vec<&PrimitiveAggregator> = self.primitives.iter().collect();
        results.sort_by_key(|p| p.key());
        results
    }

    fn selector(&self) -> &SlotSelector {
        &self.selector
    }

    fn reset(&mut self) {
        self.primitives.iter_mut().for_each(PrimitiveAggregator::reset);
    }
}

impl fmt::Debug for IncrementalFieldAggregator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IncrementalFieldAggregator")
            .field("selector", &self.selector)
            .field("keys", &self.keys)
            .field("primitives", &self.primitives)
            .finish()
    }
}

/// Rollup field aggregator with every primitive created up front
#[derive(Debug)]
pub struct DownSamplingFieldAggregator {
    target: SlotSelector,
    ratio: usize,
    primitives: Vec<PrimitiveAggregator>,
}

impl DownSamplingFieldAggregator {
    /// Create primitives for every key of `spec`, one point per target slot
    pub fn new(spec: &AggregatorSpec, target: SlotRange, ratio: usize, pool: Arc<FloatArrayPool>) -> Result<Self> {
        let selector = SlotSelector::from_range(target, 1)?;
        let mut primitives: Vec<PrimitiveAggregator> = spec
            .primitive_keys()
            .into_iter()
            .map(|(field_id, agg_type)| PrimitiveAggregator::new(field_id, agg_type, selector, Arc::clone(&pool)))
            .collect();
        primitives.sort_by_key(|p| p.field_id());
        Ok(Self {
            target: selector,
            ratio,
            primitives,
        })
    }

    /// Factory mapping a source family selector to its target slots.
    ///
    /// The selector's ratio is used as the down-sampling ratio.
    pub fn factory(pool: Arc<FloatArrayPool>) -> AggregatorFactory {
        Arc::new(move |spec: &AggregatorSpec, source: SlotSelector| {
            let ratio = source.ratio();
            let target = SlotRange {
                start: source.start() / ratio,
                end: source.end() / ratio,
            };
            match DownSamplingFieldAggregator::new(spec, target, ratio, Arc::clone(&pool)) {
                Ok(aggregator) => Box::new(aggregator) as Box<dyn FieldAggregator>,
                // target is derived from a valid selector, start <= end always holds
                Err(e) => {
                    tracing::warn!("Falling back to an incremental aggregator: {}", e);
                    Box::new(IncrementalFieldAggregator::new(source, Arc::clone(&pool)))
                }
            }
        })
    }

    pub fn ratio(&self) -> usize {
        self.ratio
    }

    /// Merge the decoded streams of primitive `field_id` over `source` into every matching primitive
    pub fn down_sample(
        &mut self,
        source: SlotRange,
        field_id: PrimitiveFieldId,
        streams: &[Option<&dyn ValueGetter>],
    ) -> Result<()> {
        let target = self.target.range();
        let ratio = self.ratio;
        for primitive in self.primitives.iter_mut().filter(|p| p.field_id() == field_id) {
            let agg_type = primitive.agg_type();
            down_sampling_into(target, source, ratio, agg_type, streams, &mut primitive.sink())?;
        }
        Ok(())
    }
}

impl FieldAggregator for DownSamplingFieldAggregator {
    /// Rollup data arrives through `down_sample`
    fn aggregate(&mut self, _it: &mut dyn FieldIterator) {}

    fn results(&self) -> Vec<&PrimitiveAggregator> {
        self.primitives.iter().collect()
    }

    fn selector(&self) -> &SlotSelector {
        &self.target
    }

    fn reset(&mut self) {
        self.primitives.iter_mut().for_each(PrimitiveAggregator::reset);
    }

    fn source_slot(&self, slot: Slot) -> Slot {
        slot.saturating_mul(self.ratio)
    }

    fn as_down_sampling(&mut self) -> Option<&mut DownSamplingFieldAggregator> {
        Some(self)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::iterator::{MemoryFieldIterator, MemoryPrimitiveIterator};
    use tsagg_core::{FieldType, FloatArray, FunctionType, SUMMARY_COUNT, SUMMARY_MAX, SUMMARY_SUM};

    fn pool() -> Arc<FloatArrayPool> {
        Arc::new(FloatArrayPool::default())
    }

    #[test]
    fn test_incremental_creates_per_key() {
        let selector = SlotSelector::new(0, 9, 1).unwrap();
        let mut agg = IncrementalFieldAggregator::new(selector, pool());
        let mut it = MemoryFieldIterator::new(vec![
            MemoryPrimitiveIterator::new(SUMMARY_MAX, AggType::Max, vec![(1, 5.0), (2, 6.0)]),
            MemoryPrimitiveIterator::new(SUMMARY_SUM, AggType::Sum, vec![(1, 1.0)]),
            MemoryPrimitiveIterator::new(SUMMARY_SUM, AggType::Sum, vec![(1, 2.0)]),
        ]);
        agg.aggregate(&mut it);

        let results = agg.results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].key(), (SUMMARY_SUM, AggType::Sum));
        assert_eq!(results[0].values().unwrap().get_value(1), 3.0);
        assert_eq!(results[1].key(), (SUMMARY_MAX, AggType::Max));
        assert_eq!(results[1].values().unwrap().size(), 2);
    }

    #[test]
    fn test_incremental_skips_and_stops() {
        let selector = SlotSelector::new(10, 19, 5).unwrap();
        let mut agg = IncrementalFieldAggregator::new(selector, pool());
        let mut it = MemoryFieldIterator::with_keys(
            &[(1, AggType::Sum)],
            vec![(5, 100.0), (10, 1.0), (14, 1.0), (15, 2.0), (20, 100.0), (21, 100.0)],
        );
        agg.aggregate(&mut it);

        let results = agg.results();
        let points: Vec<_> = results[0].iter().collect();
        assert_eq!(points, vec![(10, 2.0), (15, 2.0)]);
    }

    #[test]
    fn test_incremental_reset() {
        let selector = SlotSelector::new(0, 9, 1).unwrap();
        let mut agg = IncrementalFieldAggregator::new(selector, pool());
        agg.aggregate(&mut MemoryFieldIterator::with_keys(&[(1, AggType::Sum)], vec![(1, 1.0)]));
        agg.reset();
        assert_eq!(agg.results()[0].values().unwrap().size(), 0);
    }

    #[test]
    fn test_requested_keys_reduce_incoming_stream() {
        let spec = AggregatorSpec::new("f", FieldType::Sum)
            .function(FunctionType::Sum)
            .function(FunctionType::Max);
        let factory = IncrementalFieldAggregator::factory(pool());
        let mut agg = factory(&spec, SlotSelector::new(0, 9, 5).unwrap());
        agg.aggregate(&mut MemoryFieldIterator::with_keys(
            &[(1, AggType::Sum)],
            vec![(0, 1.0), (3, 4.0), (6, 2.0)],
        ));

        let results = agg.results();
        assert_eq!(results.len(), 2);
        assert_eq!(results[0].key(), (1, AggType::Sum));
        assert_eq!(results[0].iter().collect::<Vec<_>>(), vec![(0, 5.0), (5, 2.0)]);
        assert_eq!(results[1].key(), (1, AggType::Max));
        assert_eq!(results[1].iter().collect::<Vec<_>>(), vec![(0, 4.0), (5, 2.0)]);
    }

    #[test]
    fn test_requested_keys_skip_other_fields() {
        let spec = AggregatorSpec::new("latency", FieldType::Summary).function(FunctionType::Max);
        let selector = SlotSelector::new(0, 9, 1).unwrap();
        let mut agg = IncrementalFieldAggregator::with_keys(selector, spec.primitive_keys(), pool());
        agg.aggregate(&mut MemoryFieldIterator::new(vec![
            MemoryPrimitiveIterator::new(SUMMARY_SUM, AggType::Sum, vec![(1, 1.0)]),
            MemoryPrimitiveIterator::new(SUMMARY_MAX, AggType::Max, vec![(1, 5.0), (1, 3.0)]),
        ]));

        let results = agg.results();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].key(), (SUMMARY_MAX, AggType::Max));
        assert_eq!(results[0].values().unwrap().get_value(1), 5.0);
    }

    #[test]
    fn test_down_sampling_precreated_and_sorted() {
        let spec = AggregatorSpec::new("latency", FieldType::Summary)
            .function(FunctionType::Max)
            .function(FunctionType::Avg);
        let target = SlotRange::new(0, 5).unwrap();
        let mut agg = DownSamplingFieldAggregator::new(&spec, target, 10, pool()).unwrap();

        let ids: Vec<_> = agg.results().iter().map(|p| p.field_id()).collect();
        assert_eq!(ids, vec![SUMMARY_SUM, SUMMARY_COUNT, SUMMARY_MAX]);

        // aggregate is a no-op
        agg.aggregate(&mut MemoryFieldIterator::with_keys(&[(SUMMARY_SUM, AggType::Sum)], vec![(1, 1.0)]));
        assert!(agg.results().iter().all(|p| p.values().is_none()));
    }

    #[test]
    fn test_down_sample_into_primitives() {
        let spec = AggregatorSpec::new("f", FieldType::Sum);
        let mut agg = DownSamplingFieldAggregator::new(&spec, SlotRange::new(0, 2).unwrap(), 10, pool()).unwrap();

        let a = FloatArray::from_pairs(30, [(0, 1.0), (9, 2.0), (25, 3.0)]);
        let b = FloatArray::from_pairs(30, [(5, 4.0)]);
        let streams: Vec<Option<&dyn ValueGetter>> = vec![Some(&a), None, Some(&b)];
        agg.as_down_sampling()
            .unwrap()
            .down_sample(SlotRange::new(0, 29).unwrap(), 1, &streams)
            .unwrap();

        let values = agg.results()[0].values().unwrap().clone();
        assert_eq!(values.get_value(0), 7.0);
        assert!(!values.has_value(1));
        assert_eq!(values.get_value(2), 3.0);
    }

    #[test]
    fn test_down_sampling_factory_target_range() {
        let factory = DownSamplingFieldAggregator::factory(pool());
        let spec = AggregatorSpec::new("f", FieldType::Sum);
        let source = SlotSelector::new(30, 119, 30).unwrap();
        let mut agg = factory(&spec, source);
        assert_eq!(agg.selector().range(), SlotRange { start: 1, end: 3 });
        assert_eq!(agg.as_down_sampling().unwrap().ratio(), 30);
        assert_eq!(agg.source_slot(2), 60);
    }
}
