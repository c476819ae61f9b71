//! Expression evaluator
//!
//! Evaluates select items against the prepared fields of one group. Any
//! expression that cannot be answered yields no operand and is left out of
//! the results; evaluation never fails.

use crate::expr::{BinaryOp, Expr};
use crate::field::FieldStore;
use std::collections::BTreeMap;
use tsagg_aggregation::functions::{binary_eval, binary_eval_scalar, quantile, rate};
use tsagg_core::{FloatArray, FunctionType};

/// Value produced by evaluating an expression
#[derive(Debug, Clone, PartialEq)]
pub enum Operand {
    Vector(FloatArray),
    Scalar(f64),
}

/// Evaluates select items over a prepared [`FieldStore`]
#[derive(Debug)]
pub struct ExpressionEvaluator {
    select_items: Vec<Expr>,
    /// Query interval in nanoseconds, used by `rate`
    query_interval: i64,
    store: Option<FieldStore>,
    results: BTreeMap<String, FloatArray>,
}

impl ExpressionEvaluator {
    pub fn new(select_items: Vec<Expr>, query_interval: i64) -> Self {
        Self {
            select_items,
            query_interval,
            store: None,
            results: BTreeMap::new(),
        }
    }

    /// Install the prepared fields to evaluate against
    pub fn prepare(&mut self, store: FieldStore) {
        self.store = Some(store);
    }

    /// Evaluate every select item; a no-op without select items or prepared fields
    pub fn eval(&mut self) {
        let Some(store) = self.store.as_ref() else {
            return;
        };
        for item in &self.select_items {
            let mut operands = eval_expr(item, store, None, self.query_interval);
            if operands.len() != 1 {
                continue;
            }
            if let Some(Operand::Vector(values)) = operands.pop() {
                self.results.insert(item.result_name(), values);
            }
        }
    }

    /// Results keyed by alias or canonical expression text
    pub fn results(&self) -> &BTreeMap<String, FloatArray> {
        &self.results
    }

    /// Move the results out, leaving the evaluator ready for the next group
    pub fn take_results(&mut self) -> BTreeMap<String, FloatArray> {
        std::mem::take(&mut self.results)
    }

    /// Clear prepared field state and results for reuse
    pub fn reset(&mut self) {
        if let Some(store) = self.store.as_mut() {
            store.reset();
        }
        self.results.clear();
    }
}

fn eval_expr(expr: &Expr, store: &FieldStore, func: Option<FunctionType>, query_interval: i64) -> Vec<Operand> {
    match expr {
        Expr::SelectItem { expr, .. } | Expr::Paren(expr) => eval_expr(expr, store, func, query_interval),
        Expr::Field(name) => store
            .get(name)
            .and_then(|field| field.values(func))
            .map(|values| values.into_iter().map(Operand::Vector).collect())
            .unwrap_or_default(),
        Expr::Number(value) => vec![Operand::Scalar(*value)],
        Expr::Call { func: name, params } => eval_call(name, params, store, query_interval)
            .into_iter()
            .collect(),
        Expr::Binary { op, left, right } => {
            if !op.is_arithmetic() {
                tracing::debug!("Unsupported operator '{}' in {}", op.symbol().trim(), expr);
                return Vec::new();
            }
            let (Some(left), Some(right)) = (
                single(eval_expr(left, store, func, query_interval)),
                single(eval_expr(right, store, func, query_interval)),
            ) else {
                return Vec::new();
            };
            eval_binary(*op, left, right).into_iter().collect()
        }
        Expr::Tag(_) => Vec::new(),
    }
}

fn eval_call(name: &str, params: &[Expr], store: &FieldStore, query_interval: i64) -> Option<Operand> {
    let Some(func) = FunctionType::from_name(name) else {
        tracing::debug!("Unknown function '{}'", name);
        return None;
    };
    let mut args = Vec::with_capacity(params.len());
    for param in params {
        args.push(single(eval_expr(param, store, Some(func), query_interval))?);
    }

    match func {
        FunctionType::Sum
        | FunctionType::Count
        | FunctionType::Min
        | FunctionType::Max
        | FunctionType::Last
        | FunctionType::First
        | FunctionType::Avg => match args.pop() {
            Some(vector @ Operand::Vector(_)) if args.is_empty() => Some(vector),
            _ => None,
        },
        FunctionType::Rate => match args.as_slice() {
            [Operand::Vector(values)] => Some(Operand::Vector(rate(query_interval, values))),
            _ => None,
        },
        FunctionType::Quantile => match args.as_slice() {
            [Operand::Scalar(q)] => eval_quantile(*q, store),
            _ => None,
        },
        FunctionType::Stddev => None,
    }
}

fn eval_quantile(q: f64, store: &FieldStore) -> Option<Operand> {
    let buckets = store.histogram_buckets();
    let refs: Vec<(f64, &FloatArray)> = buckets.iter().map(|(ub, values)| (*ub, values)).collect();
    match quantile(q, &refs) {
        Ok(values) => Some(Operand::Vector(values)),
        Err(e) => {
            tracing::warn!("Failed to evaluate quantile({}): {}", q, e);
            None
        }
    }
}

fn eval_binary(op: BinaryOp, left: Operand, right: Operand) -> Option<Operand> {
    match (left, right) {
        (Operand::Vector(l), Operand::Vector(r)) => binary_eval(op, Some(&l), Some(&r)).map(Operand::Vector),
        (Operand::Vector(v), Operand::Scalar(s)) => binary_eval_scalar(op, &v, s, false).map(Operand::Vector),
        (Operand::Scalar(s), Operand::Vector(v)) => binary_eval_scalar(op, &v, s, true).map(Operand::Vector),
        (Operand::Scalar(l), Operand::Scalar(r)) => op.apply(l, r).map(Operand::Scalar),
    }
}

fn single(mut operands: Vec<Operand>) -> Option<Operand> {
    if operands.len() == 1 {
        operands.pop()
    } else {
        None
    }
}
