//! Grouping aggregation
//!
//! Series sharing the same tag-value string fall into one group. Each group
//! owns a [`FieldAggregates`], one [`SeriesAggregator`] per requested field.

use crate::downsample::ValueGetter;
use crate::error::Result;
use crate::field::AggregatorFactory;
use crate::iterator::{FieldIterator, SeriesIterator};
use crate::series::{SeriesAggregator, TimeSpec};
use crate::spec::AggregatorSpecs;
use fxhash::FxHashMap;
use tsagg_core::{AggregationSettings, FieldType, PrimitiveFieldId, SlotRange, Timestamp};

/// Series aggregators of one group, in spec order
#[derive(Debug)]
pub struct FieldAggregates {
    series: Vec<SeriesAggregator>,
}

impl FieldAggregates {
    /// Create one series aggregator per spec
    pub fn new(specs: &AggregatorSpecs, time: TimeSpec, factory: &AggregatorFactory) -> Self {
        let series = specs
            .iter()
            .map(|spec| SeriesAggregator::new(spec.clone(), time, factory.clone()))
            .collect();
        Self { series }
    }

    /// Route one family of a field to its series aggregator.
    ///
    /// Fields without a spec are ignored.
    pub fn aggregate(
        &mut self,
        family_time: Timestamp,
        field_name: &str,
        field_type: FieldType,
        it: &mut dyn FieldIterator,
    ) {
        if let Some(series) = self.series.iter_mut().find(|s| s.field_name() == field_name) {
            series.set_field_type(field_type);
            series.aggregate(family_time, it);
        }
    }

    /// Consume every field and family of `series`
    pub fn aggregate_series(&mut self, series: &mut dyn SeriesIterator) {
        while let Some(mut field) = series.next_field() {
            let field_name = field.field_name().to_string();
            if !self.series.iter().any(|s| s.field_name() == field_name) {
                tracing::trace!("Skipping field {} without aggregator", field_name);
                continue;
            }
            let field_type = field.field_type();
            while let Some((family_time, mut it)) = field.next_family() {
                self.aggregate(family_time, &field_name, field_type, it.as_mut());
            }
        }
    }

    /// Route decoded streams of one field's family to its series aggregator.
    ///
    /// Returns `Ok(false)` for fields without a spec.
    pub fn down_sample(
        &mut self,
        family_time: Timestamp,
        field_name: &str,
        field_id: PrimitiveFieldId,
        source: SlotRange,
        streams: &[Option<&dyn ValueGetter>],
    ) -> Result<bool> {
        match self.series.iter_mut().find(|s| s.field_name() == field_name) {
            Some(series) => series.down_sample(family_time, source, field_id, streams),
            None => Ok(false),
        }
    }

    pub fn iter(&self) -> std::slice::Iter<'_, SeriesAggregator> {
        self.series.iter()
    }

    /// Series aggregator of a field by name
    pub fn get(&self, field_name: &str) -> Option<&SeriesAggregator> {
        self.series.iter().find(|s| s.field_name() == field_name)
    }

    pub fn reset(&mut self) {
        self.series.iter_mut().for_each(SeriesAggregator::reset);
    }
}

/// Groups series by tag-value string
pub struct GroupingAggregator {
    specs: AggregatorSpecs,
    time: TimeSpec,
    factory: AggregatorFactory,
    max_groups: usize,
    groups: FxHashMap<String, FieldAggregates>,
}

impl GroupingAggregator {
    /// Create a grouping aggregator without a group limit
    pub fn new(specs: AggregatorSpecs, time: TimeSpec, factory: AggregatorFactory) -> Self {
        Self {
            specs,
            time,
            factory,
            max_groups: 0,
            groups: FxHashMap::default(),
        }
    }

    /// Apply the limits of `settings`
    pub fn with_settings(mut self, settings: &AggregationSettings) -> Self {
        self.max_groups = settings.max_groups;
        self
    }

    /// Group of `tags`, created on first use.
    ///
    /// `None` when a new group would exceed the group limit.
    fn group_mut(&mut self, tags: &str) -> Option<&mut FieldAggregates> {
        if !self.groups.contains_key(tags) {
            if self.max_groups > 0 && self.groups.len() >= self.max_groups {
                tracing::warn!(
                    "Group limit {} reached, skipping series with tags '{}'",
                    self.max_groups,
                    tags
                );
                return None;
            }
            tracing::debug!("Creating group '{}'", tags);
            let aggregates = FieldAggregates::new(&self.specs, self.time, &self.factory);
            self.groups.insert(tags.to_string(), aggregates);
        }
        self.groups.get_mut(tags)
    }

    /// Aggregate one series into its group.
    ///
    /// Returns `false` when the series opens a new group past the group limit
    /// and was skipped.
    pub fn aggregate(&mut self, series: &mut dyn SeriesIterator) -> bool {
        let tags = series.tags().to_string();
        match self.group_mut(&tags) {
            Some(aggregates) => {
                aggregates.aggregate_series(series);
                true
            }
            None => false,
        }
    }

    /// Down-sample decoded streams of one field's family into the group of `tags`.
    ///
    /// Returns `Ok(false)` when the streams were not used: the group limit was
    /// reached, the field has no spec, or the family is outside the time range.
    pub fn down_sample(
        &mut self,
        tags: &str,
        family_time: Timestamp,
        field_name: &str,
        field_id: PrimitiveFieldId,
        source: SlotRange,
        streams: &[Option<&dyn ValueGetter>],
    ) -> Result<bool> {
        match self.group_mut(tags) {
            Some(aggregates) => aggregates.down_sample(family_time, field_name, field_id, source, streams),
            None => Ok(false),
        }
    }

    /// Groups in tag-string order
    pub fn groups(&self) -> Vec<(&str, &FieldAggregates)> {
        let mut groups: Vec<(&str, &FieldAggregates)> =
            self.groups.iter().map(|(tags, agg)| (tags.as_str(), agg)).collect();
        groups.sort_by(|a, b| a.0.cmp(b.0));
        groups
    }

    /// Take the groups in tag-string order
    pub fn into_groups(self) -> Vec<(String, FieldAggregates)> {
        let mut groups: Vec<(String, FieldAggregates)> = self.groups.into_iter().collect();
        groups.sort_by(|a, b| a.0.cmp(&b.0));
        groups
    }

    pub fn time_spec(&self) -> &TimeSpec {
        &self.time
    }

    pub fn len(&self) -> usize {
        self.groups.len()
    }

    pub fn is_empty(&self) -> bool {
        self.groups.is_empty()
    }

    /// Drop every group
    pub fn reset(&mut self) {
        self.groups.clear();
    }
}

impl std::fmt::Debug for GroupingAggregator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GroupingAggregator")
            .field("specs", &self.specs)
            .field("time", &self.time)
            .field("max_groups", &self.max_groups)
            .field("groups", &self.groups.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::field::{DownSamplingFieldAggregator, IncrementalFieldAggregator};
    use crate::iterator::{MemoryFieldIterator, MemoryFieldSeries, MemorySeries};
    use crate::spec::AggregatorSpec;
    use std::sync::Arc;
    use tsagg_core::{AggType, FloatArray, FloatArrayPool, TimeRange};

    const HOUR: i64 = 3600;

    fn grouping() -> GroupingAggregator {
        let specs = AggregatorSpecs::new(vec![
            AggregatorSpec::new("f1", FieldType::Sum),
            AggregatorSpec::new("f2", FieldType::Max),
        ]);
        let time = TimeSpec::new(TimeRange::new(0, 2 * HOUR - 1), 1, 60, HOUR);
        let factory = IncrementalFieldAggregator::factory(Arc::new(FloatArrayPool::default()));
        GroupingAggregator::new(specs, time, factory)
    }

    fn series(tags: &str, field: &str, family: Timestamp, points: Vec<(usize, f64)>) -> MemorySeries {
        MemorySeries::new(tags).field(
            MemoryFieldSeries::new(field, FieldType::Sum)
                .family(family, MemoryFieldIterator::with_keys(&[(1, AggType::Sum)], points)),
        )
    }

    #[test]
    fn test_groups_by_tags() {
        let mut agg = grouping();
        assert!(agg.aggregate(&mut series("host=b", "f1", 0, vec![(0, 1.0)])));
        assert!(agg.aggregate(&mut series("host=a", "f1", 0, vec![(0, 2.0)])));
        assert!(agg.aggregate(&mut series("host=b", "f1", HOUR, vec![(0, 4.0)])));

        assert_eq!(agg.len(), 2);
        let groups = agg.groups();
        assert_eq!(groups.iter().map(|(t, _)| *t).collect::<Vec<_>>(), vec!["host=a", "host=b"]);

        let f1 = groups[1].1.get("f1").unwrap();
        let points: Vec<_> = f1.points().map(|p| (p.timestamp, p.value)).collect();
        assert_eq!(points, vec![(0, 1.0), (HOUR, 4.0)]);
        assert!(groups[1].1.get("f2").unwrap().points().next().is_none());
    }

    #[test]
    fn test_unknown_field_ignored() {
        let mut agg = grouping();
        agg.aggregate(&mut series("host=a", "other", 0, vec![(0, 1.0)]));
        let groups = agg.groups();
        assert_eq!(groups.len(), 1);
        assert!(groups[0].1.iter().all(|s| s.points().next().is_none()));
    }

    #[test]
    fn test_field_type_tracked() {
        let mut aggregates = grouping().into_groups();
        assert!(aggregates.is_empty());

        let mut agg = grouping();
        agg.aggregate(&mut series("host=a", "f2", 0, vec![(0, 1.0)]));
        aggregates = agg.into_groups();
        assert_eq!(aggregates[0].1.get("f2").unwrap().field_type(), FieldType::Sum);
    }

    #[test]
    fn test_group_limit() {
        let mut agg = grouping().with_settings(&AggregationSettings { max_groups: 1 });
        assert!(agg.aggregate(&mut series("host=a", "f1", 0, vec![(0, 1.0)])));
        assert!(!agg.aggregate(&mut series("host=b", "f1", 0, vec![(0, 1.0)])));
        assert!(agg.aggregate(&mut series("host=a", "f1", 0, vec![(1, 1.0)])));
        assert_eq!(agg.len(), 1);

        agg.reset();
        assert!(agg.is_empty());
    }

    #[test]
    fn test_down_sample_into_groups() {
        let specs = AggregatorSpecs::in_schema_order(vec![AggregatorSpec::new("f1", FieldType::Sum)]);
        let time = TimeSpec::new(TimeRange::new(0, 2 * HOUR - 1), 1, 60, HOUR);
        let factory = DownSamplingFieldAggregator::factory(Arc::new(FloatArrayPool::default()));
        let mut agg = GroupingAggregator::new(specs, time, factory).with_settings(&AggregationSettings { max_groups: 1 });

        let stream = FloatArray::from_pairs(3600, [(0, 1.0), (1, 2.0), (61, 4.0)]);
        let streams: Vec<Option<&dyn ValueGetter>> = vec![Some(&stream)];
        let source = SlotRange::new(0, 3599).unwrap();
        assert!(agg.down_sample("host=a", HOUR, "f1", 1, source, &streams).unwrap());
        assert!(!agg.down_sample("host=a", HOUR, "other", 1, source, &streams).unwrap());
        assert!(!agg.down_sample("host=b", HOUR, "f1", 1, source, &streams).unwrap());
        assert_eq!(agg.len(), 1);

        let groups = agg.groups();
        let points: Vec<_> = groups[0].1.get("f1").unwrap().points().map(|p| (p.timestamp, p.value)).collect();
        assert_eq!(points, vec![(HOUR, 3.0), (HOUR + 60, 4.0)]);
    }
}
