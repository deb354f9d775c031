//! # Limit Operator
//!
//! Emits the first `k` rows of its input, order preserved.

use std::sync::Arc;

use eyre::Result;

use crate::exec::cost::{operator_cost, COST_MEMORY_READ};
use crate::exec::tasks::{unary_input, Task};
use crate::types::Recordset;

pub struct LimitTask {
    limit: usize,
}

impl LimitTask {
    pub fn new(limit: usize) -> Self {
        Self { limit }
    }
}

impl Task for LimitTask {
    fn name(&self) -> &'static str {
        "limit"
    }

    fn cost(&self) -> f64 {
        operator_cost(self.limit as u64, COST_MEMORY_READ)
    }

    fn execute(&self, inputs: &[Arc<Recordset>]) -> Result<Recordset> {
        let input = unary_input(self.name(), inputs)?;
        let mut out = Recordset::new(input.columns().to_vec());
        for row in input.iter().take(self.limit) {
            out.push_row(row.clone())?;
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ColumnDef, DataType, Value};

    fn input(n: i64) -> Arc<Recordset> {
        let mut rs = Recordset::new(vec![ColumnDef::new("id", DataType::Int8, false)]);
        for i in 0..n {
            rs.push(i + 2, vec![Value::Int8(i)]).unwrap();
        }
        Arc::new(rs)
    }

    #[test]
    fn takes_prefix() {
        let out = LimitTask::new(3).execute(&[input(10)]).unwrap();
        assert_eq!(out.len(), 3);
        assert_eq!(out.row(2).unwrap().values[0], Value::Int8(2));
    }

    #[test]
    fn limit_beyond_input_is_identity() {
        let out = LimitTask::new(100).execute(&[input(4)]).unwrap();
        assert_eq!(out.len(), 4);
    }

    #[test]
    fn zero_limit_is_empty() {
        let out = LimitTask::new(0).execute(&[input(4)]).unwrap();
        assert!(out.is_empty());
    }
}
