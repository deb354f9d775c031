//! # Sort Operator
//!
//! Stable sort of the input rows by one key column. Null keys sort
//! after every non-null key regardless of direction, and stability
//! preserves the producing task's emission order among equal keys.

use std::cmp::Ordering;
use std::sync::Arc;

use eyre::Result;

use crate::error::DbError;
use crate::exec::cost::{operator_cost, COST_CPU};
use crate::exec::predicate::compare_values;
use crate::exec::tasks::{unary_input, Task};
use crate::types::Recordset;

pub struct SortTask {
    column: String,
    ascending: bool,
    rows: u64,
}

impl SortTask {
    pub fn new(column: impl Into<String>, ascending: bool, row_estimate: u64) -> Self {
        Self {
            column: column.into(),
            ascending,
            rows: row_estimate,
        }
    }
}

impl Task for SortTask {
    fn name(&self) -> &'static str {
        "sort"
    }

    fn cost(&self) -> f64 {
        operator_cost(self.rows, COST_CPU)
    }

    fn execute(&self, inputs: &[Arc<Recordset>]) -> Result<Recordset> {
        let input = unary_input(self.name(), inputs)?;
        let idx = input
            .column_index(&self.column)
            .ok_or_else(|| DbError::ColumnDoesNotExist {
                name: self.column.clone(),
            })?;

        let mut rows: Vec<_> = input.iter().cloned().collect();
        rows.sort_by(|a, b| {
            let ordering = match (a.values[idx].is_null(), b.values[idx].is_null()) {
                (true, true) => Ordering::Equal,
                (true, false) => return Ordering::Greater,
                (false, true) => return Ordering::Less,
                (false, false) => {
                    compare_values(&a.values[idx], &b.values[idx]).unwrap_or(Ordering::Equal)
                }
            };
            if self.ascending {
                ordering
            } else {
                ordering.reverse()
            }
        });

        Ok(Recordset::with_rows(input.columns().to_vec(), rows))
    }
}
