//! Select expression trees
//!
//! Expressions arrive already parsed. Their `Display` output is the
//! canonical text used to name un-aliased results.

use serde::{Deserialize, Serialize};
use std::fmt;

pub use tsagg_aggregation::BinaryOp;

/// Parsed select expression
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Expr {
    /// Top-level select item with an optional alias
    SelectItem { expr: Box<Expr>, alias: Option<String> },
    /// Function call such as `sum(f)` or `quantile(0.99)`
    Call { func: String, params: Vec<Expr> },
    /// Parenthesized expression
    Paren(Box<Expr>),
    Binary { op: BinaryOp, left: Box<Expr>, right: Box<Expr> },
    /// Field reference
    Field(String),
    /// Numeric literal
    Number(f64),
    /// Tag reference, not evaluated
    Tag(String),
}

impl Expr {
    pub fn field(name: impl Into<String>) -> Self {
        Expr::Field(name.into())
    }

    pub fn number(value: f64) -> Self {
        Expr::Number(value)
    }

    pub fn call(func: impl Into<String>, params: Vec<Expr>) -> Self {
        Expr::Call {
            func: func.into(),
            params,
        }
    }

    pub fn paren(expr: Expr) -> Self {
        Expr::Paren(Box::new(expr))
    }

    pub fn binary(op: BinaryOp, left: Expr, right: Expr) -> Self {
        Expr::Binary {
            op,
            left: Box::new(left),
            right: Box::new(right),
        }
    }

    /// Select item named by its canonical text
    pub fn select(expr: Expr) -> Self {
        Expr::SelectItem {
            expr: Box::new(expr),
            alias: None,
        }
    }

    /// Select item named by `alias`
    pub fn select_as(expr: Expr, alias: impl Into<String>) -> Self {
        Expr::SelectItem {
            expr: Box::new(expr),
            alias: Some(alias.into()),
        }
    }

    /// Name of the result produced by this expression: the alias when present, else the canonical text
    pub fn result_name(&self) -> String {
        match self {
            Expr::SelectItem { alias: Some(alias), .. } => alias.clone(),
            Expr::SelectItem { expr, alias: None } => expr.to_string(),
            _ => self.to_string(),
        }
    }

    /// Field names referenced anywhere in the tree, in order of appearance
    pub fn field_names(&self) -> Vec<&str> {
        let mut names = Vec::new();
        self.collect_fields(&mut names);
        names
    }

    fn collect_fields<'a>(&'a self, names: &mut Vec<&'a str>) {
        match self {
            Expr::SelectItem { expr, .. } | Expr::Paren(expr) => expr.collect_fields(names),
            Expr::Call { params, .. } => params.iter().for_each(|p| p.collect_fields(names)),
            Expr::Binary { left, right, .. } => {
                left.collect_fields(names);
                right.collect_fields(names);
            }
            Expr::Field(name) => {
                if !names.contains(&name.as_str()) {
                    names.push(name);
                }
            }
            Expr::Number(_) | Expr::Tag(_) => {}
        }
    }
}

impl fmt::Display for Expr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Expr::SelectItem { expr, alias } => match alias {
                Some(alias) => write!(f, "{} as {}", expr, alias),
                None => write!(f, "{}", expr),
            },
            Expr::Call { func, params } => {
                write!(f, "{}(", func)?;
                for (i, param) in params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(",")?;
                    }
                    write!(f, "{}", param)?;
                }
                f.write_str(")")
            }
            Expr::Paren(expr) => write!(f, "({})", expr),
            Expr::Binary { op, left, right } => write!(f, "{}{}{}", left, op, right),
            Expr::Field(name) | Expr::Tag(name) => f.write_str(name),
            Expr::Number(value) => write!(f, "{}", value),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_canonical_text() {
        let expr = Expr::binary(
            BinaryOp::Mul,
            Expr::paren(Expr::binary(BinaryOp::Add, Expr::field("f1"), Expr::field("f2"))),
            Expr::number(100.0),
        );
        assert_eq!(expr.to_string(), "(f1+f2)*100");
        assert_eq!(Expr::call("quantile", vec![Expr::number(0.99)]).to_string(), "quantile(0.99)");
        assert_eq!(
            Expr::binary(BinaryOp::And, Expr::field("a"), Expr::field("b")).to_string(),
            "a and b"
        );
    }

    #[test]
    fn test_result_name() {
        let sum = Expr::call("sum", vec![Expr::field("f")]);
        assert_eq!(Expr::select(sum.clone()).result_name(), "sum(f)");
        assert_eq!(Expr::select_as(sum.clone(), "total").result_name(), "total");
        assert_eq!(Expr::select_as(sum, "total").to_string(), "sum(f) as total");
    }

    #[test]
    fn test_field_names() {
        let expr = Expr::select(Expr::binary(
            BinaryOp::Div,
            Expr::call("sum", vec![Expr::field("a")]),
            Expr::binary(BinaryOp::Add, Expr::field("b"), Expr::field("a")),
        ));
        assert_eq!(expr.field_names(), vec!["a", "b"]);
    }

    #[test]
    fn test_serde() {
        let expr = Expr::select_as(Expr::call("max", vec![Expr::field("f")]), "m");
        let json = serde_json::to_string(&expr).unwrap();
        let parsed: Expr = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, expr);
    }
}
