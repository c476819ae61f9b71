//! Sparse float array
//!
//! A fixed-capacity array of `f64` values paired with a presence bitmap
//! (8 slots per byte). It is the unit of value storage for every
//! aggregation layer. Not safe for concurrent mutation.

use crate::error::CoreError;
use serde::{Deserialize, Serialize};

/// Fixed-capacity sparse array of floats
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "FloatArrayLayout")]
pub struct FloatArray {
    capacity: usize,
    values: Vec<f64>,
    marks: Vec<u8>,
    size: usize,
}

impl FloatArray {
    /// Create an empty array holding at most `capacity` values
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            values: vec![0.0; capacity],
            marks: vec![0; capacity.div_ceil(8)],
            size: 0,
        }
    }

    /// Build an array from `(index, value)` pairs; out-of-range pairs are dropped
    pub fn from_pairs(capacity: usize, pairs: impl IntoIterator<Item = (usize, f64)>) -> Self {
        let mut array = Self::new(capacity);
        for (idx, value) in pairs {
            array.set_value(idx, value);
        }
        array
    }

    /// Maximum number of values
    #[inline]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Number of present values
    #[inline]
    pub fn size(&self) -> usize {
        self.size
    }

    /// True when no value is present
    #[inline]
    pub fn is_empty(&self) -> bool {
        self.size == 0
    }

    /// Check whether a value is present at `idx`
    #[inline]
    pub fn has_value(&self, idx: usize) -> bool {
        if idx >= self.capacity {
            return false;
        }
        self.marks[idx >> 3] & (1 << (idx & 7)) != 0
    }

    /// Value at `idx`, 0.0 when absent or out of range
    #[inline]
    pub fn get_value(&self, idx: usize) -> f64 {
        if self.has_value(idx) {
            self.values[idx]
        } else {
            0.0
        }
    }

    /// Value at `idx` if present
    #[inline]
    pub fn value(&self, idx: usize) -> Option<f64> {
        if self.has_value(idx) {
            Some(self.values[idx])
        } else {
            None
        }
    }

    /// Store `value` at `idx`; writes outside `[0, capacity)` are ignored
    #[inline]
    pub fn set_value(&mut self, idx: usize, value: f64) {
        if idx >= self.capacity {
            return;
        }
        let block = idx >> 3;
        let bit = 1 << (idx & 7);
        if self.marks[block] & bit == 0 {
            self.marks[block] |= bit;
            self.size += 1;
        }
        self.values[idx] = value;
    }

    /// Clear every presence bit, keeping the capacity.
    ///
    /// Backing values are left as-is; they are only meaningful where presence is set.
    pub fn reset(&mut self) {
        if self.size == 0 {
            return;
        }
        self.marks.iter_mut().for_each(|m| *m = 0);
        self.size = 0;
    }

    /// Present `(index, value)` pairs in ascending index order
    pub fn iter(&self) -> FloatArrayIter<'_> {
        FloatArrayIter {
            array: self,
            idx: 0,
            remaining: self.size,
        }
    }
}

/// Serialized form of a [`FloatArray`], checked before use
#[derive(Deserialize)]
struct FloatArrayLayout {
    capacity: usize,
    values: Vec<f64>,
    marks: Vec<u8>,
    size: usize,
}

impl TryFrom<FloatArrayLayout> for FloatArray {
    type Error = CoreError;

    fn try_from(layout: FloatArrayLayout) -> Result<Self, Self::Error> {
        let FloatArrayLayout {
            capacity,
            values,
            mut marks,
            size,
        } = layout;
        if values.len() != capacity {
            return Err(CoreError::InvalidArray(format!(
                "{} values for capacity {}",
                values.len(),
                capacity
            )));
        }
        if marks.len() != capacity.div_ceil(8) {
            return Err(CoreError::InvalidArray(format!(
                "{} mark bytes for capacity {}",
                marks.len(),
                capacity
            )));
        }
        // bits past capacity never count
        if capacity % 8 != 0 {
            if let Some(last) = marks.last_mut() {
                *last &= (1u8 << (capacity % 8)) - 1;
            }
        }
        let present: usize = marks.iter().map(|m| m.count_ones() as usize).sum();
        if present != size {
            return Err(CoreError::InvalidArray(format!(
                "size {} does not match {} present values",
                size, present
            )));
        }
        Ok(Self {
            capacity,
            values,
            marks,
            size,
        })
    }
}

/// Iterator over the present values of a [`FloatArray`]
pub struct FloatArrayIter<'a> {
    array: &'a FloatArray,
    idx: usize,
    remaining: usize,
}

impl Iterator for FloatArrayIter<'_> {
    type Item = (usize, f64);

    fn next(&mut self) -> Option<Self::Item> {
        while self.remaining > 0 && self.idx < self.array.capacity {
            let block = self.array.marks[self.idx >> 3];
            if block == 0 {
                // skip the whole empty block
                self.idx = (self.idx | 7) + 1;
                continue;
            }
            let idx = self.idx;
            self.idx += 1;
            if block & (1 << (idx & 7)) != 0 {
                self.remaining -= 1;
                return Some((idx, self.array.values[idx]));
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (self.remaining, Some(self.remaining))
    }
}

impl<'a> IntoIterator for &'a FloatArray {
    type Item = (usize, f64);
    type IntoIter = FloatArrayIter<'a>;

    fn into_iter(self) -> Self::IntoIter {
        self.iter()
    }
}
