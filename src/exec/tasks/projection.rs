//! # Projection and Aggregate Operators
//!
//! [`ProjectionTask`] emits the column subset named by the query, alias
//! renames honored, order preserved.
//!
//! [`AggregateTask`] collapses its input to a single-row, single-column
//! Float8 recordset. Every numeric input promotes to `f64` before
//! combining; null cells are skipped. Conventions for empty (or
//! all-null) inputs:
//!
//! - `count` counts rows (nulls included) and is 0 on empty input;
//! - `sum` is 0.0;
//! - `min`/`max` emit their identity (`+inf` / `-inf`); the min
//!   accumulator starts at `+inf`, not 0, so all-positive inputs
//!   reduce correctly;
//! - `mean` has no identity and fails with `EmptyAggregate`.
//!
//! The aggregate output row is synthetic; it carries tuple-id 0, which
//! the storage layer never assigns.

use std::sync::Arc;

use eyre::Result;

use crate::error::DbError;
use crate::exec::cost::{operator_cost, COST_CPU, COST_MEMORY_READ};
use crate::exec::tasks::{unary_input, Task};
use crate::types::{ColumnDef, DataType, Recordset, Value};

/// One projected field: source column and optional alias.
#[derive(Debug, Clone)]
pub struct ProjectionField {
    pub column: String,
    pub alias: Option<String>,
}

impl ProjectionField {
    pub fn named(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            alias: None,
        }
    }

    pub fn aliased(column: impl Into<String>, alias: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            alias: Some(alias.into()),
        }
    }

    fn output_name(&self) -> &str {
        self.alias.as_deref().unwrap_or(&self.column)
    }
}

/// SELECT projection: column subset with aliases.
pub struct ProjectionTask {
    fields: Vec<ProjectionField>,
    rows: u64,
}

impl ProjectionTask {
    pub fn new(fields: Vec<ProjectionField>, row_estimate: u64) -> Self {
        Self {
            fields,
            rows: row_estimate,
        }
    }
}

impl Task for ProjectionTask {
    fn name(&self) -> &'static str {
        "projection"
    }

    fn cost(&self) -> f64 {
        operator_cost(self.rows, COST_MEMORY_READ)
    }

    fn execute(&self, inputs: &[Arc<Recordset>]) -> Result<Recordset> {
        let input = unary_input(self.name(), inputs)?;

        let mut indices = Vec::with_capacity(self.fields.len());
        let mut columns = Vec::with_capacity(self.fields.len());
        for field in &self.fields {
            let idx = input.column_index(&field.column).ok_or_else(|| {
                DbError::ColumnDoesNotExist {
                    name: field.column.clone(),
                }
            })?;
            indices.push(idx);
            columns.push(input.columns()[idx].clone().with_name(field.output_name()));
        }

        let mut out = Recordset::new(columns);
        for row in input.iter() {
            let values = indices.iter().map(|&i| row.values[i].clone()).collect();
            out.push(row.tuple_id, values)?;
        }
        Ok(out)
    }
}

/// Aggregate kinds over a single numeric column (`count` over rows).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AggregateOp {
    Count,
    Sum,
    Min,
    Max,
    Mean,
}

impl AggregateOp {
    fn output_name(&self, column: Option<&str>) -> String {
        match column {
            Some(c) => format!("{}({})", self.op_name(), c),
            None => format!("{}(*)", self.op_name()),
        }
    }

    fn op_name(&self) -> &'static str {
        match self {
            AggregateOp::Count => "count",
            AggregateOp::Sum => "sum",
            AggregateOp::Min => "min",
            AggregateOp::Max => "max",
            AggregateOp::Mean => "mean",
        }
    }
}

/// Collapses the input to a 1x1 Float8 recordset.
pub struct AggregateTask {
    op: AggregateOp,
    column: Option<String>,
    rows: u64,
}

impl AggregateTask {
    pub fn count(row_estimate: u64) -> Self {
        Self {
            op: AggregateOp::Count,
            column: None,
            rows: row_estimate,
        }
    }

    pub fn new(op: AggregateOp, column: impl Into<String>, row_estimate: u64) -> Self {
        Self {
            op,
            column: Some(column.into()),
            rows: row_estimate,
        }
    }

    fn fold(&self, input: &Recordset) -> Result<f64> {
        if self.op == AggregateOp::Count {
            return Ok(input.len() as f64);
        }
        let column = self
            .column
            .as_deref()
            .ok_or_else(|| eyre::eyre!("{} aggregate requires a column", self.op.op_name()))?;
        let idx = input
            .column_index(column)
            .ok_or_else(|| DbError::ColumnDoesNotExist {
                name: column.to_string(),
            })?;
        let def = &input.columns()[idx];
        if !def.data_type().is_numeric() {
            return Err(DbError::TypeMismatch {
                column: column.to_string(),
                expected: "numeric scalar",
                actual: def.data_type().type_name(),
            }
            .into());
        }

        let mut sum = 0.0f64;
        let mut min = f64::INFINITY;
        let mut max = f64::NEG_INFINITY;
        let mut observed = 0u64;
        for row in input.iter() {
            let value = &row.values[idx];
            if value.is_null() {
                continue;
            }
            let x = value.as_f64()?;
            sum += x;
            min = min.min(x);
            max = max.max(x);
            observed += 1;
        }

        match self.op {
            AggregateOp::Sum => Ok(sum),
            AggregateOp::Min => Ok(min),
            AggregateOp::Max => Ok(max),
            AggregateOp::Mean => {
                if observed == 0 {
                    Err(DbError::EmptyAggregate.into())
                } else {
                    Ok(sum / observed as f64)
                }
            }
            AggregateOp::Count => unreachable!("count handled above"),
        }
    }
}

impl Task for AggregateTask {
    fn name(&self) -> &'static str {
        "aggregate"
    }

    fn cost(&self) -> f64 {
        operator_cost(self.rows, COST_CPU)
    }

    fn execute(&self, inputs: &[Arc<Recordset>]) -> Result<Recordset> {
        let input = unary_input(self.name(), inputs)?;
        let result = self.fold(input)?;
        let mut out = Recordset::new(vec![ColumnDef::new(
            self.op.output_name(self.column.as_deref()),
            DataType::Float8,
            false,
        )]);
        out.push(0, vec![Value::Float8(result)])?;
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn input() -> Arc<Recordset> {
        let mut rs = Recordset::new(vec![
            ColumnDef::new("id", DataType::Int8, false),
            ColumnDef::new("score", DataType::Float8, true),
            ColumnDef::new("label", DataType::Text, true),
        ]);
        rs.push(2, vec![Value::Int8(1), Value::Float8(2.0), Value::Null])
            .unwrap();
        rs.push(
            3,
            vec![
                Value::Int8(2),
                Value::Float8(6.0),
                Value::Text("x".into()),
            ],
        )
        .unwrap();
        rs.push(4, vec![Value::Int8(3), Value::Null, Value::Null])
            .unwrap();
        Arc::new(rs)
    }

    fn scalar(rs: &Recordset) -> f64 {
        assert_eq!(rs.len(), 1);
        assert_eq!(rs.columns().len(), 1);
        match &rs.row(0).unwrap().values[0] {
            Value::Float8(x) => *x,
            other => panic!("expected Float8, got {:?}", other),
        }
    }

    #[test]
    fn projection_subsets_and_aliases() {
        let task = ProjectionTask::new(
            vec![
                ProjectionField::aliased("score", "s"),
                ProjectionField::named("id"),
            ],
            3,
        );
        let out = task.execute(&[input()]).unwrap();
        assert_eq!(out.columns().len(), 2);
        assert_eq!(out.columns()[0].name(), "s");
        assert_eq!(out.columns()[1].name(), "id");
        assert_eq!(out.row(0).unwrap().values[1], Value::Int8(1));
        assert_eq!(out.row(0).unwrap().tuple_id, 2);
    }

    #[test]
    fn projection_unknown_column_fails() {
        let task = ProjectionTask::new(vec![ProjectionField::named("missing")], 3);
        let err = task.execute(&[input()]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DbError>(),
            Some(DbError::ColumnDoesNotExist { .. })
        ));
    }

    #[test]
    fn count_includes_null_cells() {
        let out = AggregateTask::count(3).execute(&[input()]).unwrap();
        assert_eq!(scalar(&out), 3.0);
        assert_eq!(out.columns()[0].name(), "count(*)");
    }

    #[test]
    fn sum_min_max_mean_skip_nulls() {
        let sum = AggregateTask::new(AggregateOp::Sum, "score", 3)
            .execute(&[input()])
            .unwrap();
        assert_eq!(scalar(&sum), 8.0);

        let min = AggregateTask::new(AggregateOp::Min, "score", 3)
            .execute(&[input()])
            .unwrap();
        assert_eq!(scalar(&min), 2.0);

        let max = AggregateTask::new(AggregateOp::Max, "score", 3)
            .execute(&[input()])
            .unwrap();
        assert_eq!(scalar(&max), 6.0);

        let mean = AggregateTask::new(AggregateOp::Mean, "score", 3)
            .execute(&[input()])
            .unwrap();
        assert_eq!(scalar(&mean), 4.0);
    }

    #[test]
    fn min_of_all_positive_input_is_correct() {
        let mut rs = Recordset::new(vec![ColumnDef::new("x", DataType::Int4, false)]);
        for (i, v) in [7, 3, 9].iter().enumerate() {
            rs.push(i as i64 + 2, vec![Value::Int4(*v)]).unwrap();
        }
        let out = AggregateTask::new(AggregateOp::Min, "x", 3)
            .execute(&[Arc::new(rs)])
            .unwrap();
        assert_eq!(scalar(&out), 3.0);
    }

    #[test]
    fn empty_input_conventions() {
        let empty = Arc::new(Recordset::new(vec![ColumnDef::new(
            "x",
            DataType::Float8,
            true,
        )]));

        assert_eq!(
            scalar(&AggregateTask::count(0).execute(&[Arc::clone(&empty)]).unwrap()),
            0.0
        );
        assert_eq!(
            scalar(
                &AggregateTask::new(AggregateOp::Sum, "x", 0)
                    .execute(&[Arc::clone(&empty)])
                    .unwrap()
            ),
            0.0
        );
        assert_eq!(
            scalar(
                &AggregateTask::new(AggregateOp::Min, "x", 0)
                    .execute(&[Arc::clone(&empty)])
                    .unwrap()
            ),
            f64::INFINITY
        );
        assert_eq!(
            scalar(
                &AggregateTask::new(AggregateOp::Max, "x", 0)
                    .execute(&[Arc::clone(&empty)])
                    .unwrap()
            ),
            f64::NEG_INFINITY
        );

        let err = AggregateTask::new(AggregateOp::Mean, "x", 0)
            .execute(&[empty])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DbError>(),
            Some(DbError::EmptyAggregate)
        ));
    }

    #[test]
    fn non_numeric_column_rejected() {
        let err = AggregateTask::new(AggregateOp::Sum, "label", 3)
            .execute(&[input()])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DbError>(),
            Some(DbError::TypeMismatch { .. })
        ));
    }
}
