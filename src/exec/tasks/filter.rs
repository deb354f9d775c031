//! # Filter Operator
//!
//! Evaluates a boolean predicate row by row, emitting passing rows with
//! their order and tuple-ids intact.

use std::sync::Arc;

use eyre::Result;

use crate::exec::cost::{operator_cost, COST_CPU};
use crate::exec::predicate::Predicate;
use crate::exec::tasks::{unary_input, Task};
use crate::types::Recordset;

pub struct FilterTask {
    predicate: Predicate,
    rows: u64,
}

impl FilterTask {
    pub fn new(predicate: Predicate, row_estimate: u64) -> Self {
        Self {
            predicate,
            rows: row_estimate,
        }
    }
}

impl Task for FilterTask {
    fn name(&self) -> &'static str {
        "filter"
    }

    fn cost(&self) -> f64 {
        operator_cost(self.rows, COST_CPU)
    }

    fn execute(&self, inputs: &[Arc<Recordset>]) -> Result<Recordset> {
        let input = unary_input(self.name(), inputs)?;
        let mut out = Recordset::new(input.columns().to_vec());
        for row in input.iter() {
            if self.predicate.evaluate(input.columns(), row)? {
                out.push_row(row.clone())?;
            }
        }
        Ok(out)
    }
}
