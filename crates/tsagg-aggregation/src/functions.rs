//! Aggregate function library
//!
//! Stateless binary reducers used while merging samples, plus vector
//! functions that operate over whole [`FloatArray`]s.

use crate::error::Result;
use serde::{Deserialize, Serialize};
use std::fmt;
use tsagg_core::{AggType, CoreError, FloatArray, ONE_SECOND_NANOS};

/// Merge `b` into the running value `a`
#[inline]
pub fn reduce(agg_type: AggType, a: f64, b: f64) -> f64 {
    match agg_type {
        AggType::Sum | AggType::Count => a + b,
        AggType::Min => {
            if b < a {
                b
            } else {
                a
            }
        }
        AggType::Max => {
            if b > a {
                b
            } else {
                a
            }
        }
        AggType::Last => b,
        AggType::First => a,
    }
}

/// Binary operators of a select expression
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    And,
    Or,
    Eq,
    NotEq,
    Lt,
    Gt,
}

impl BinaryOp {
    /// Only `+ - * /` are evaluated over vectors
    pub fn is_arithmetic(&self) -> bool {
        matches!(self, BinaryOp::Add | BinaryOp::Sub | BinaryOp::Mul | BinaryOp::Div)
    }

    /// Apply an arithmetic operator; division by zero yields 0.0
    #[inline]
    pub fn apply(&self, left: f64, right: f64) -> Option<f64> {
        match self {
            BinaryOp::Add => Some(left + right),
            BinaryOp::Sub => Some(left - right),
            BinaryOp::Mul => Some(left * right),
            BinaryOp::Div => {
                if right == 0.0 {
                    Some(0.0)
                } else {
                    Some(left / right)
                }
            }
            _ => None,
        }
    }

    pub fn symbol(&self) -> &'static str {
        match self {
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::And => " and ",
            BinaryOp::Or => " or ",
            BinaryOp::Eq => "=",
            BinaryOp::NotEq => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Gt => ">",
        }
    }
}

impl fmt::Display for BinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.symbol())
    }
}

/// Per-index `sum / count`; indices without a non-zero count stay absent
pub fn avg(sum: &FloatArray, count: &FloatArray) -> Option<FloatArray> {
    if sum.capacity() != count.capacity() {
        return None;
    }
    let mut result = FloatArray::new(sum.capacity());
    for (idx, c) in count.iter() {
        if c != 0.0 {
            result.set_value(idx, sum.get_value(idx) / c);
        }
    }
    Some(result)
}

/// Per-second rate of every present value over an interval in nanoseconds
pub fn rate(interval_ns: i64, values: &FloatArray) -> FloatArray {
    let seconds = interval_ns as f64 / ONE_SECOND_NANOS as f64;
    let mut result = FloatArray::new(values.capacity());
    for (idx, v) in values.iter() {
        let r = if seconds == 0.0 { 0.0 } else { v / seconds };
        result.set_value(idx, r);
    }
    result
}

/// Estimate the `q` quantile from histogram buckets given as `(upper_bound, counts)`.
///
/// Counts are per-bucket (not cumulative). The result holds a value at every
/// index where at least one bucket has a value.
pub fn quantile(q: f64, buckets: &[(f64, &FloatArray)]) -> Result<FloatArray> {
    if !(0.0..=1.0).contains(&q) {
        return Err(CoreError::InvalidQuantile(q).into());
    }
    if buckets.len() < 2 {
        return Err(CoreError::NotEnoughBuckets(buckets.len()).into());
    }
    let capacity = buckets[0].1.capacity();
    if let Some((_, mismatched)) = buckets.iter().find(|(_, b)| b.capacity() != capacity) {
        return Err(CoreError::BucketLengthMismatch {
            expected: capacity,
            actual: mismatched.capacity(),
        }
        .into());
    }

    let mut sorted: Vec<(f64, &FloatArray)> = buckets.to_vec();
    sorted.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
    let upper_bounds: Vec<f64> = sorted.iter().map(|(ub, _)| *ub).collect();

    let mut result = FloatArray::new(capacity);
    let mut cumulative = vec![0.0; sorted.len()];
    for idx in 0..capacity {
        if !sorted.iter().any(|(_, b)| b.has_value(idx)) {
            continue;
        }
        let mut total = 0.0;
        for (k, (_, counts)) in sorted.iter().enumerate() {
            total += counts.get_value(idx);
            cumulative[k] = total;
        }
        result.set_value(idx, bucket_quantile(q, &upper_bounds, &cumulative));
    }
    Ok(result)
}

fn bucket_quantile(q: f64, upper_bounds: &[f64], cumulative: &[f64]) -> f64 {
    let last = cumulative.len() - 1;
    let total = cumulative[last];
    if total == 0.0 {
        return 0.0;
    }
    if upper_bounds.len() == 1 {
        return upper_bounds[0];
    }

    let rank = q * total;
    let b = cumulative.partition_point(|&c| c < rank).min(last);
    if b == last {
        // the +Inf bucket is never reported
        return upper_bounds[last - 1];
    }
    if b == 0 && upper_bounds[0] <= 0.0 {
        return upper_bounds[0];
    }

    let (start, below) = if b == 0 {
        (0.0, 0.0)
    } else {
        (upper_bounds[b - 1], cumulative[b - 1])
    };
    let end = upper_bounds[b];
    let count = cumulative[b] - below;
    if count == 0.0 {
        return start;
    }
    start + (end - start) * ((rank - below) / count)
}

/// Element-wise arithmetic over the union of present indices.
///
/// Absent values count as 0.0. Returns `None` for a missing operand,
/// mismatched capacities or a non-arithmetic operator.
pub fn binary_eval(op: BinaryOp, left: Option<&FloatArray>, right: Option<&FloatArray>) -> Option<FloatArray> {
    let (left, right) = (left?, right?);
    if !op.is_arithmetic() || left.capacity() != right.capacity() {
        return None;
    }
    let mut result = FloatArray::new(left.capacity());
    for idx in 0..left.capacity() {
        if !left.has_value(idx) && !right.has_value(idx) {
            continue;
        }
        if let Some(v) = op.apply(left.get_value(idx), right.get_value(idx)) {
            result.set_value(idx, v);
        }
    }
    Some(result)
}

/// Vector/scalar arithmetic over the present indices of `vector`
pub fn binary_eval_scalar(op: BinaryOp, vector: &FloatArray, scalar: f64, scalar_on_left: bool) -> Option<FloatArray> {
    if !op.is_arithmetic() {
        return None;
    }
    let mut result = FloatArray::new(vector.capacity());
    for (idx, v) in vector.iter() {
        let value = if scalar_on_left {
            op.apply(scalar, v)
        } else {
            op.apply(v, scalar)
        };
        if let Some(value) = value {
            result.set_value(idx, value);
        }
    }
    Some(result)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn array(pairs: &[(usize, f64)]) -> FloatArray {
        FloatArray::from_pairs(10, pairs.iter().copied())
    }

    #[test]
    fn test_reducers() {
        assert_eq!(reduce(AggType::Sum, 1.0, 2.0), 3.0);
        assert_eq!(reduce(AggType::Count, 1.0, 2.0), 3.0);
        assert_eq!(reduce(AggType::Min, 1.0, 2.0), 1.0);
        assert_eq!(reduce(AggType::Max, 1.0, 2.0), 2.0);
        assert_eq!(reduce(AggType::Last, 1.0, 2.0), 2.0);
        assert_eq!(reduce(AggType::First, 1.0, 2.0), 1.0);
    }

    #[test]
    fn test_avg() {
        let sum = array(&[(0, 10.0), (1, 9.0), (2, 4.0)]);
        let count = array(&[(0, 2.0), (1, 0.0)]);
        let result = avg(&sum, &count).unwrap();
        assert_eq!(result.get_value(0), 5.0);
        assert!(!result.has_value(1));
        assert!(!result.has_value(2));
        assert!(avg(&sum, &FloatArray::new(3)).is_none());
    }

    #[test]
    fn test_rate() {
        let values = array(&[(0, 100.0), (4, 50.0)]);
        let result = rate(10 * ONE_SECOND_NANOS, &values);
        assert_eq!(result.get_value(0), 10.0);
        assert_eq!(result.get_value(4), 5.0);
        assert_eq!(result.size(), 2);
    }

    #[test]
    fn test_binary_eval_laws() {
        let v = array(&[(1, 3.0), (5, -2.0)]);
        let zero = array(&[(1, 0.0), (5, 0.0)]);

        assert_eq!(binary_eval(BinaryOp::Add, Some(&zero), Some(&v)).unwrap(), v);
        assert_eq!(binary_eval(BinaryOp::Sub, Some(&v), Some(&zero)).unwrap(), v);

        let divided = binary_eval(BinaryOp::Div, Some(&v), Some(&zero)).unwrap();
        for (idx, _) in v.iter() {
            assert!(divided.has_value(idx));
            assert_eq!(divided.get_value(idx), 0.0);
        }

        assert!(binary_eval(BinaryOp::Add, None, Some(&v)).is_none());
        assert!(binary_eval(BinaryOp::Mul, Some(&v), None).is_none());
    }

    #[test]
    fn test_binary_eval_union() {
        let left = array(&[(0, 2.0)]);
        let right = array(&[(1, 3.0)]);
        let result = binary_eval(BinaryOp::Add, Some(&left), Some(&right)).unwrap();
        assert_eq!(result.size(), 2);
        assert_eq!(result.get_value(0), 2.0);
        assert_eq!(result.get_value(1), 3.0);

        let empty_div = binary_eval(BinaryOp::Div, Some(&FloatArray::new(10)), Some(&FloatArray::new(10))).unwrap();
        assert!(empty_div.is_empty());
    }

    #[test]
    fn test_binary_eval_rejects() {
        let v = array(&[(1, 3.0)]);
        assert!(binary_eval(BinaryOp::And, Some(&v), Some(&v)).is_none());
        assert!(binary_eval(BinaryOp::Add, Some(&v), Some(&FloatArray::new(3))).is_none());
    }

    #[test]
    fn test_binary_eval_scalar() {
        let v = array(&[(2, 4.0)]);
        let result = binary_eval_scalar(BinaryOp::Mul, &v, 100.0, false).unwrap();
        assert_eq!(result.get_value(2), 400.0);
        assert_eq!(result.size(), 1);

        let result = binary_eval_scalar(BinaryOp::Sub, &v, 10.0, true).unwrap();
        assert_eq!(result.get_value(2), 6.0);

        let result = binary_eval_scalar(BinaryOp::Div, &v, 0.0, false).unwrap();
        assert_eq!(result.get_value(2), 0.0);
        assert!(binary_eval_scalar(BinaryOp::Or, &v, 1.0, false).is_none());
    }

    fn histogram() -> Vec<(f64, FloatArray)> {
        [1.0, 2.0, 4.0, 8.0, 20.0, 50.0, f64::INFINITY]
            .iter()
            .map(|ub| (*ub, FloatArray::from_pairs(4, [(0, 1.0), (1, 2.0), (2, 3.0), (3, 4.0)])))
            .collect()
    }

    #[test]
    fn test_quantile_ends() {
        let buckets = histogram();
        let refs: Vec<(f64, &FloatArray)> = buckets.iter().map(|(ub, a)| (*ub, a)).collect();

        let low = quantile(0.0, &refs).unwrap();
        let high = quantile(1.0, &refs).unwrap();
        for idx in 0..4 {
            assert_eq!(low.get_value(idx), 0.0);
            assert_eq!(high.get_value(idx), 50.0);
        }
    }

    #[test]
    fn test_quantile_interpolates() {
        // 10 observations in (0,1], 10 in (1,2], none above
        let b1 = FloatArray::from_pairs(1, [(0, 10.0)]);
        let b2 = FloatArray::from_pairs(1, [(0, 10.0)]);
        let inf = FloatArray::from_pairs(1, [(0, 0.0)]);
        let refs = vec![(f64::INFINITY, &inf), (2.0, &b2), (1.0, &b1)];

        let median = quantile(0.5, &refs).unwrap();
        assert!((median.get_value(0) - 1.0).abs() < 1e-9);

        let p75 = quantile(0.75, &refs).unwrap();
        assert!((p75.get_value(0) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn test_quantile_zero_total_and_negative_bound() {
        let zero = FloatArray::from_pairs(1, [(0, 0.0)]);
        let refs = vec![(1.0, &zero), (f64::INFINITY, &zero)];
        assert_eq!(quantile(0.5, &refs).unwrap().get_value(0), 0.0);

        let neg = FloatArray::from_pairs(1, [(0, 5.0)]);
        let rest = FloatArray::from_pairs(1, [(0, 0.0)]);
        let refs = vec![(-1.0, &neg), (10.0, &rest), (f64::INFINITY, &rest)];
        assert_eq!(quantile(0.5, &refs).unwrap().get_value(0), -1.0);
    }

    #[test]
    fn test_quantile_errors() {
        let a = FloatArray::new(4);
        let b = FloatArray::new(5);
        assert!(quantile(1.5, &[(1.0, &a), (2.0, &a)]).is_err());
        assert!(quantile(-0.1, &[(1.0, &a), (2.0, &a)]).is_err());
        assert!(quantile(0.5, &[(1.0, &a)]).is_err());
        assert!(quantile(0.5, &[(1.0, &a), (2.0, &b)]).is_err());
    }
}
