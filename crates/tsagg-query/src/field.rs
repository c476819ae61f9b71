//! Prepared fields
//!
//! A [`PreparedField`] flattens the per-family blocks of one series
//! aggregator onto the query's point grid. A [`FieldStore`] holds the
//! prepared fields of one group, keyed by field name.

use std::collections::BTreeMap;
use tsagg_aggregation::functions::{avg, reduce};
use tsagg_aggregation::{FieldAggregates, SeriesAggregator, TimeSpec};
use tsagg_core::{
    histogram_upper_bound, AggType, FieldType, FloatArray, FunctionType, PrimitiveFieldId, SUMMARY_COUNT,
    SUMMARY_SUM,
};

/// Primitive values of one field on the query point grid
#[derive(Debug, Clone, PartialEq)]
pub struct PreparedField {
    field_type: FieldType,
    point_count: usize,
    // sorted by key
    primitives: Vec<((PrimitiveFieldId, AggType), FloatArray)>,
}

impl PreparedField {
    /// Create an empty field with `point_count` points per primitive
    pub fn new(field_type: FieldType, point_count: usize) -> Self {
        Self {
            field_type,
            point_count,
            primitives: Vec::new(),
        }
    }

    /// Flatten every family block of `series` onto the query grid
    pub fn from_series(series: &SeriesAggregator) -> Self {
        let time: &TimeSpec = series.time_spec();
        let mut field = Self::new(series.field_type(), time.point_count());
        for point in series.points() {
            if let Some(idx) = time.point_index(point.timestamp) {
                field.merge(point.field_id, point.agg_type, idx, point.value);
            }
        }
        field
    }

    pub fn field_type(&self) -> FieldType {
        self.field_type
    }

    pub fn point_count(&self) -> usize {
        self.point_count
    }

    /// Merge `value` into the primitive `(field_id, agg_type)` at point `idx`
    pub fn merge(&mut self, field_id: PrimitiveFieldId, agg_type: AggType, idx: usize, value: f64) {
        let key = (field_id, agg_type);
        let pos = match self.primitives.binary_search_by_key(&key, |(k, _)| *k) {
            Ok(pos) => pos,
            Err(pos) => {
                self.primitives.insert(pos, (key, FloatArray::new(self.point_count)));
                pos
            }
        };
        let values = &mut self.primitives[pos].1;
        match values.value(idx) {
            Some(current) => values.set_value(idx, reduce(agg_type, current, value)),
            None => values.set_value(idx, value),
        }
    }

    /// Values of one primitive
    pub fn primitive(&self, field_id: PrimitiveFieldId, agg_type: AggType) -> Option<&FloatArray> {
        self.primitives
            .binary_search_by_key(&(field_id, agg_type), |(k, _)| *k)
            .ok()
            .map(|pos| &self.primitives[pos].1)
    }

    /// Values answering `func`, or the field type's default function when `None`.
    ///
    /// Returns `None` when the function is unsupported or a required
    /// primitive was never written.
    pub fn values(&self, func: Option<FunctionType>) -> Option<Vec<FloatArray>> {
        let func = func.unwrap_or_else(|| self.field_type.default_function());
        if self.field_type == FieldType::Summary && func == FunctionType::Avg {
            let sum = self.primitive(SUMMARY_SUM, AggType::Sum)?;
            let count = self.primitive(SUMMARY_COUNT, AggType::Count)?;
            return avg(sum, count).map(|values| vec![values]);
        }
        self.field_type
            .primitive_fields(func)?
            .iter()
            .map(|(id, agg)| self.primitive(*id, *agg).cloned())
            .collect()
    }

    /// Clear every primitive, keeping the allocations
    pub fn reset(&mut self) {
        self.primitives.iter_mut().for_each(|(_, values)| values.reset());
    }
}

/// Prepared fields of one group
#[derive(Debug, Clone, Default, PartialEq)]
pub struct FieldStore {
    fields: BTreeMap<String, PreparedField>,
}

impl FieldStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Prepare every series aggregator of a group
    pub fn from_aggregates(aggregates: &FieldAggregates) -> Self {
        let fields = aggregates
            .iter()
            .map(|series| (series.field_name().to_string(), PreparedField::from_series(series)))
            .collect();
        Self { fields }
    }

    pub fn insert(&mut self, name: impl Into<String>, field: PreparedField) {
        self.fields.insert(name.into(), field);
    }

    pub fn get(&self, name: &str) -> Option<&PreparedField> {
        self.fields.get(name)
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &PreparedField)> {
        self.fields.iter().map(|(name, field)| (name.as_str(), field))
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    /// Default values of every histogram bucket field as `(upper_bound, counts)`
    pub fn histogram_buckets(&self) -> Vec<(f64, FloatArray)> {
        self.fields
            .iter()
            .filter_map(|(name, field)| {
                let upper_bound = histogram_upper_bound(name)?;
                let mut values = field.values(None)?;
                if values.len() != 1 {
                    return None;
                }
                values.pop().map(|v| (upper_bound, v))
            })
            .collect()
    }

    pub fn reset(&mut self) {
        self.fields.values_mut().for_each(PreparedField::reset);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use tsagg_aggregation::{AggregatorSpec, IncrementalFieldAggregator, MemoryFieldIterator};
    use tsagg_core::{FloatArrayPool, TimeRange, SUMMARY_MAX};

    #[test]
    fn test_from_series_maps_onto_grid() {
        // 1s slots, 10 slots per point, 100s families, query 50..249
        let time = TimeSpec::new(TimeRange::new(50, 249), 1, 10, 100);
        let factory = IncrementalFieldAggregator::factory(Arc::new(FloatArrayPool::default()));
        let mut series = SeriesAggregator::new(AggregatorSpec::new("f", FieldType::Sum), time, factory);
        series.aggregate(0, &mut MemoryFieldIterator::with_keys(&[(1, AggType::Sum)], vec![(55, 1.0), (59, 2.0)]));
        series.aggregate(100, &mut MemoryFieldIterator::with_keys(&[(1, AggType::Sum)], vec![(0, 4.0)]));
        series.aggregate(200, &mut MemoryFieldIterator::with_keys(&[(1, AggType::Sum)], vec![(49, 8.0)]));

        let field = PreparedField::from_series(&series);
        assert_eq!(field.point_count(), 20);
        let values = field.primitive(1, AggType::Sum).unwrap();
        assert_eq!(values.get_value(0), 3.0);
        assert_eq!(values.get_value(5), 4.0);
        assert_eq!(values.get_value(19), 8.0);
        assert_eq!(values.size(), 3);
    }

    #[test]
    fn test_summary_values() {
        let mut field = PreparedField::new(FieldType::Summary, 4);
        field.merge(SUMMARY_SUM, AggType::Sum, 1, 10.0);
        field.merge(SUMMARY_COUNT, AggType::Count, 1, 4.0);
        field.merge(SUMMARY_MAX, AggType::Max, 1, 7.0);
        field.merge(SUMMARY_MAX, AggType::Max, 1, 3.0);

        let avg = field.values(None).unwrap();
        assert_eq!(avg.len(), 1);
        assert_eq!(avg[0].get_value(1), 2.5);

        assert_eq!(field.values(Some(FunctionType::Max)).unwrap()[0].get_value(1), 7.0);
        assert!(field.values(Some(FunctionType::Min)).is_none());
        assert!(field.values(Some(FunctionType::Rate)).is_none());
    }

    #[test]
    fn test_histogram_buckets() {
        let mut store = FieldStore::new();
        for (name, count) in [("__bucket_1", 1.0), ("__bucket_+Inf", 2.0), ("other", 3.0)] {
            let mut field = PreparedField::new(FieldType::Histogram, 2);
            field.merge(1, AggType::Sum, 0, count);
            store.insert(name, field);
        }
        let mut buckets = store.histogram_buckets();
        buckets.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap());
        assert_eq!(buckets.len(), 2);
        assert_eq!(buckets[0].0, 1.0);
        assert!(buckets[1].0.is_infinite());

        store.reset();
        assert_eq!(store.get("other").unwrap().values(None).unwrap()[0].size(), 0);
    }
}
