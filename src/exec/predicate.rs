//! # Row Predicates
//!
//! Boolean predicate trees evaluated against recordset rows, used by the
//! filter operator and as the kNN pre-filter. Comparison follows the
//! column's type: numeric scalars compare after `f64` promotion, text
//! compares lexicographically, booleans by value. A comparison touching
//! `Null` is unknown and excludes the row (three-valued logic collapsed
//! to false at the operator boundary).

use std::cmp::Ordering;

use eyre::Result;

use crate::error::DbError;
use crate::types::{ColumnDef, Row, Value};

/// Comparison operators over one column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CompareOp {
    Eq,
    NotEq,
    Less,
    LessEq,
    Greater,
    GreaterEq,
}

/// Boolean predicate tree.
#[derive(Debug, Clone)]
pub enum Predicate {
    Compare {
        column: String,
        op: CompareOp,
        value: Value,
    },
    IsNull {
        column: String,
    },
    And(Box<Predicate>, Box<Predicate>),
    Or(Box<Predicate>, Box<Predicate>),
    Not(Box<Predicate>),
}

impl Predicate {
    pub fn and(self, other: Predicate) -> Predicate {
        Predicate::And(Box::new(self), Box::new(other))
    }

    pub fn or(self, other: Predicate) -> Predicate {
        Predicate::Or(Box::new(self), Box::new(other))
    }

    /// Evaluates against one row of the given schema.
    pub fn evaluate(&self, columns: &[ColumnDef], row: &Row) -> Result<bool> {
        match self {
            Predicate::Compare { column, op, value } => {
                let cell = cell(columns, row, column)?;
                match compare_values(cell, value) {
                    Some(ordering) => Ok(matches_op(*op, ordering)),
                    None => Ok(false),
                }
            }
            Predicate::IsNull { column } => Ok(cell(columns, row, column)?.is_null()),
            Predicate::And(left, right) => {
                Ok(left.evaluate(columns, row)? && right.evaluate(columns, row)?)
            }
            Predicate::Or(left, right) => {
                Ok(left.evaluate(columns, row)? || right.evaluate(columns, row)?)
            }
            Predicate::Not(inner) => Ok(!inner.evaluate(columns, row)?),
        }
    }
}

fn cell<'a>(columns: &[ColumnDef], row: &'a Row, name: &str) -> Result<&'a Value> {
    let idx = columns
        .iter()
        .position(|c| c.name() == name)
        .ok_or_else(|| DbError::ColumnDoesNotExist {
            name: name.to_string(),
        })?;
    Ok(&row.values[idx])
}

fn matches_op(op: CompareOp, ordering: Ordering) -> bool {
    match op {
        CompareOp::Eq => ordering == Ordering::Equal,
        CompareOp::NotEq => ordering != Ordering::Equal,
        CompareOp::Less => ordering == Ordering::Less,
        CompareOp::LessEq => ordering != Ordering::Greater,
        CompareOp::Greater => ordering == Ordering::Greater,
        CompareOp::GreaterEq => ordering != Ordering::Less,
    }
}

/// Compares two values; `None` when either is null or the types are
/// incomparable.
pub fn compare_values(a: &Value, b: &Value) -> Option<Ordering> {
    use Value::*;
    match (a, b) {
        (Null, _) | (_, Null) => None,
        (Bool(x), Bool(y)) => Some(x.cmp(y)),
        (Text(x), Text(y)) => Some(x.cmp(y)),
        _ => {
            let (x, y) = (a.as_f64().ok()?, b.as_f64().ok()?);
            Some(x.total_cmp(&y))
        }
    }
}
