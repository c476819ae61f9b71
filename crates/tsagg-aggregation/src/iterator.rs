//! Iterator contracts between the storage layer and the aggregators
//!
//! Storage hands the pipeline one [`SeriesIterator`] per series. A series
//! exposes one [`FieldSeriesIterator`] per field, which yields a
//! [`FieldIterator`] per storage family. A field iterator in turn yields
//! [`PrimitiveIterator`]s producing `(slot, value)` pairs in ascending slot
//! order. None of these iterators ever seek backward.
//!
//! The `Memory*` types are in-memory implementations for hosts that already
//! hold decoded data.

use std::collections::VecDeque;
use tsagg_core::{AggType, FieldType, PrimitiveFieldId, Slot, Timestamp};

/// Stream of `(slot, value)` pairs for one primitive field
pub trait PrimitiveIterator {
    /// Primitive field id
    fn field_id(&self) -> PrimitiveFieldId;
    /// How values of this primitive are merged
    fn agg_type(&self) -> AggType;
    /// Next point in ascending slot order
    fn next_point(&mut self) -> Option<(Slot, f64)>;
}

/// Primitive sub-iterators of one field inside one family
pub trait FieldIterator {
    fn next_primitive(&mut self) -> Option<Box<dyn PrimitiveIterator + '_>>;
}

/// One field of a series, split by storage family
pub trait FieldSeriesIterator {
    fn field_name(&self) -> &str;
    fn field_type(&self) -> FieldType;
    /// Next `(family_start_time, field_iterator)` pair
    fn next_family(&mut self) -> Option<(Timestamp, Box<dyn FieldIterator + '_>)>;
}

/// One series tagged with its canonical tag-value string
pub trait SeriesIterator {
    fn tags(&self) -> &str;
    fn next_field(&mut self) -> Option<Box<dyn FieldSeriesIterator + '_>>;
}

impl<S: SeriesIterator + ?Sized> SeriesIterator for Box<S> {
    fn tags(&self) -> &str {
        (**self).tags()
    }

    fn next_field(&mut self) -> Option<Box<dyn FieldSeriesIterator + '_>> {
        (**self).next_field()
    }
}

/// In-memory primitive iterator
#[derive(Debug, Clone)]
pub struct MemoryPrimitiveIterator {
    field_id: PrimitiveFieldId,
    agg_type: AggType,
    points: Vec<(Slot, f64)>,
    pos: usize,
}

impl MemoryPrimitiveIterator {
    /// Create an iterator over points sorted by slot
    pub fn new(field_id: PrimitiveFieldId, agg_type: AggType, points: Vec<(Slot, f64)>) -> Self {
        Self {
            field_id,
            agg_type,
            points,
            pos: 0,
        }
    }
}

impl PrimitiveIterator for MemoryPrimitiveIterator {
    fn field_id(&self) -> PrimitiveFieldId {
        self.field_id
    }

    fn agg_type(&self) -> AggType {
        self.agg_type
    }

    fn next_point(&mut self) -> Option<(Slot, f64)> {
        let point = self.points.get(self.pos).copied()?;
        self.pos += 1;
        Some(point)
    }
}

/// In-memory field iterator
#[derive(Debug, Clone, Default)]
pub struct MemoryFieldIterator {
    primitives: VecDeque<MemoryPrimitiveIterator>,
}

impl MemoryFieldIterator {
    pub fn new(primitives: Vec<MemoryPrimitiveIterator>) -> Self {
        Self {
            primitives: primitives.into(),
        }
    }

    /// Same points for every `(field_id, agg_type)` key, as storage does for a simple field
    pub fn with_keys(keys: &[(PrimitiveFieldId, AggType)], points: Vec<(Slot, f64)>) -> Self {
        Self::new(
            keys.iter()
                .map(|(id, agg)| MemoryPrimitiveIterator::new(*id, *agg, points.clone()))
                .collect(),
        )
    }
}

impl FieldIterator for MemoryFieldIterator {
    fn next_primitive(&mut self) -> Option<Box<dyn PrimitiveIterator + '_>> {
        let primitive = self.primitives.pop_front()?;
        Some(Box::new(primitive))
    }
}

/// In-memory field of a series
#[derive(Debug, Clone)]
pub struct MemoryFieldSeries {
    name: String,
    field_type: FieldType,
    families: VecDeque<(Timestamp, MemoryFieldIterator)>,
}

impl MemoryFieldSeries {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
            families: VecDeque::new(),
        }
    }

    /// Append the data of one family
    pub fn family(mut self, family_time: Timestamp, it: MemoryFieldIterator) -> Self {
        self.families.push_back((family_time, it));
        self
    }
}

impl FieldSeriesIterator for MemoryFieldSeries {
    fn field_name(&self) -> &str {
        &self.name
    }

    fn field_type(&self) -> FieldType {
        self.field_type
    }

    fn next_family(&mut self) -> Option<(Timestamp, Box<dyn FieldIterator + '_>)> {
        let (family_time, it) = self.families.pop_front()?;
        Some((family_time, Box::new(it)))
    }
}

/// In-memory series
#[derive(Debug, Clone)]
pub struct MemorySeries {
    tags: String,
    fields: VecDeque<MemoryFieldSeries>,
}

impl MemorySeries {
    pub fn new(tags: impl Into<String>) -> Self {
        Self {
            tags: tags.into(),
            fields: VecDeque::new(),
        }
    }

    pub fn field(mut self, field: MemoryFieldSeries) -> Self {
        self.fields.push_back(field);
        self
    }
}

impl SeriesIterator for MemorySeries {
    fn tags(&self) -> &str {
        &self.tags
    }

    fn next_field(&mut self) -> Option<Box<dyn FieldSeriesIterator + '_>> {
        let field = self.fields.pop_front()?;
        Some(Box::new(field))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_iterators() {
        let mut series = MemorySeries::new("host=a").field(
            MemoryFieldSeries::new("f1", FieldType::Sum).family(
                3600,
                MemoryFieldIterator::with_keys(&[(1, AggType::Sum)], vec![(1, 1.0), (2, 2.0)]),
            ),
        );
        assert_eq!(series.tags(), "host=a");

        let mut field = series.next_field().unwrap();
        assert_eq!(field.field_name(), "f1");
        assert_eq!(field.field_type(), FieldType::Sum);

        let (family_time, mut it) = field.next_family().unwrap();
        assert_eq!(family_time, 3600);
        let mut primitive = it.next_primitive().unwrap();
        assert_eq!(primitive.field_id(), 1);
        assert_eq!(primitive.agg_type(), AggType::Sum);
        assert_eq!(primitive.next_point(), Some((1, 1.0)));
        assert_eq!(primitive.next_point(), Some((2, 2.0)));
        assert_eq!(primitive.next_point(), None);
        drop(primitive);
        assert!(it.next_primitive().is_none());
        drop(it);
        assert!(field.next_family().is_none());
        drop(field);
        assert!(series.next_field().is_none());
    }
}
