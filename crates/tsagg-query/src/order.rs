//! Order-by and top-N selection
//!
//! Rows are ranked by an ordered list of `(field, function, direction)`
//! items over per-row field statistics. Statistics are computed once per
//! field in a single pass and cached on the row.

use fxhash::FxHashMap;
use serde::{Deserialize, Serialize};
use std::cell::RefCell;
use std::cmp::Ordering;
use std::collections::BTreeMap;
use tsagg_core::{FloatArray, FunctionType};

/// Single-pass statistics of the present values of one vector
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FieldStats {
    pub count: usize,
    pub sum: f64,
    pub min: f64,
    pub max: f64,
    pub first: f64,
    pub last: f64,
    mean: f64,
    m2: f64,
}

impl FieldStats {
    /// Compute statistics over the present values in index order
    pub fn compute(values: &FloatArray) -> Self {
        let mut stats = FieldStats::default();
        for (_, value) in values.iter() {
            if stats.count == 0 {
                stats.min = value;
                stats.max = value;
                stats.first = value;
            } else {
                stats.min = stats.min.min(value);
                stats.max = stats.max.max(value);
            }
            stats.last = value;
            stats.sum += value;
            stats.count += 1;

            // Welford
            let delta = value - stats.mean;
            stats.mean += delta / stats.count as f64;
            stats.m2 += delta * (value - stats.mean);
        }
        stats
    }

    pub fn avg(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.mean
        }
    }

    /// Population standard deviation
    pub fn stddev(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            (self.m2 / self.count as f64).sqrt()
        }
    }

    /// Statistic for `func`; 0.0 for empty vectors and functions without a statistic
    pub fn value(&self, func: FunctionType) -> f64 {
        if self.count == 0 {
            return 0.0;
        }
        match func {
            FunctionType::Count => self.count as f64,
            FunctionType::Sum => self.sum,
            FunctionType::Min => self.min,
            FunctionType::Max => self.max,
            FunctionType::First => self.first,
            FunctionType::Last => self.last,
            FunctionType::Avg => self.avg(),
            FunctionType::Stddev => self.stddev(),
            FunctionType::Rate | FunctionType::Quantile => 0.0,
        }
    }
}

/// One ordering key
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderByItem {
    /// Result name to order by
    pub field: String,
    /// Statistic of the result vector compared across rows
    pub function: FunctionType,
    pub ascending: bool,
}

impl OrderByItem {
    pub fn asc(field: impl Into<String>, function: FunctionType) -> Self {
        Self {
            field: field.into(),
            function,
            ascending: true,
        }
    }

    pub fn desc(field: impl Into<String>, function: FunctionType) -> Self {
        Self {
            field: field.into(),
            function,
            ascending: false,
        }
    }
}

/// A result row with lazily cached field statistics
#[derive(Debug)]
pub struct OrderByRow {
    tags: String,
    fields: BTreeMap<String, FloatArray>,
    stats: RefCell<FxHashMap<String, FieldStats>>,
}

impl OrderByRow {
    pub fn new(tags: impl Into<String>, fields: BTreeMap<String, FloatArray>) -> Self {
        Self {
            tags: tags.into(),
            fields,
            stats: RefCell::new(FxHashMap::default()),
        }
    }

    pub fn tags(&self) -> &str {
        &self.tags
    }

    pub fn fields(&self) -> &BTreeMap<String, FloatArray> {
        &self.fields
    }

    pub fn into_parts(self) -> (String, BTreeMap<String, FloatArray>) {
        (self.tags, self.fields)
    }

    /// Statistic `func` of field `field`; 0.0 for unknown fields
    pub fn value(&self, field: &str, func: FunctionType) -> f64 {
        if let Some(stats) = self.stats.borrow().get(field) {
            return stats.value(func);
        }
        let Some(values) = self.fields.get(field) else {
            return 0.0;
        };
        let stats = FieldStats::compute(values);
        self.stats.borrow_mut().insert(field.to_string(), stats);
        stats.value(func)
    }
}

/// Compare two rows; `Less` means `a` ranks before `b`
fn compare_rows(items: &[OrderByItem], a: &OrderByRow, b: &OrderByRow) -> Ordering {
    for item in items {
        let va = a.value(&item.field, item.function);
        let vb = b.value(&item.field, item.function);
        let cmp = va.partial_cmp(&vb).unwrap_or(Ordering::Equal);
        let cmp = if item.ascending { cmp } else { cmp.reverse() };
        if cmp != Ordering::Equal {
            return cmp;
        }
    }
    Ordering::Equal
}

/// Bounded heap keeping the best `limit` rows.
///
/// The root holds the worst kept row, so a full heap admits a new row only
/// when it strictly outranks the root.
#[derive(Debug)]
pub struct TopNHeap {
    limit: usize,
    items: Vec<OrderByItem>,
    rows: Vec<OrderByRow>,
}

impl TopNHeap {
    pub fn new(limit: usize, items: Vec<OrderByItem>) -> Self {
        Self {
            limit,
            items,
            rows: Vec::new(),
        }
    }

    /// Offer a row; returns `true` when it was kept
    pub fn try_insert(&mut self, row: OrderByRow) -> bool {
        if self.limit == 0 {
            return false;
        }
        if self.rows.len() < self.limit {
            self.rows.push(row);
            self.sift_up(self.rows.len() - 1);
            return true;
        }
        if compare_rows(&self.items, &row, &self.rows[0]) != Ordering::Less {
            return false;
        }
        self.rows[0] = row;
        self.sift_down(0);
        true
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Kept rows, best first
    pub fn into_sorted_vec(self) -> Vec<OrderByRow> {
        let items = self.items;
        let mut rows = self.rows;
        rows.sort_by(|a, b| compare_rows(&items, a, b));
        rows
    }

    /// `true` when row `i` ranks after row `j`
    fn ranks_after(&self, i: usize, j: usize) -> bool {
        compare_rows(&self.items, &self.rows[i], &self.rows[j]) == Ordering::Greater
    }

    fn sift_up(&mut self, mut idx: usize) {
        while idx > 0 {
            let parent = (idx - 1) / 2;
            if !self.ranks_after(idx, parent) {
                break;
            }
            self.rows.swap(idx, parent);
            idx = parent;
        }
    }

    fn sift_down(&mut self, mut idx: usize) {
        let len = self.rows.len();
        loop {
            let left = 2 * idx + 1;
            let right = left + 1;
            let mut worst = idx;
            if left < len && self.ranks_after(left, worst) {
                worst = left;
            }
            if right < len && self.ranks_after(right, worst) {
                worst = right;
            }
            if worst == idx {
                break;
            }
            self.rows.swap(idx, worst);
            idx = worst;
        }
    }
}

/// Keeps the first `limit` rows offered, in arrival order
#[derive(Debug)]
pub struct ResultLimiter<T> {
    limit: usize,
    rows: Vec<T>,
}

impl<T> ResultLimiter<T> {
    pub fn new(limit: usize) -> Self {
        Self {
            limit,
            rows: Vec::new(),
        }
    }

    /// Offer a row; returns `false` once the limit is reached
    pub fn try_insert(&mut self, row: T) -> bool {
        if self.is_full() {
            return false;
        }
        self.rows.push(row);
        true
    }

    pub fn is_full(&self) -> bool {
        self.rows.len() >= self.limit
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn into_vec(self) -> Vec<T> {
        self.rows
    }
}
