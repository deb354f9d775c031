//! # Execution Tasks
//!
//! One node of the execution graph: a task consumes its parents'
//! recordsets and produces one recordset. Tasks are immutable once
//! built and run on pool workers, so the contract is `Send + Sync` and
//! `execute` takes `&self`.
//!
//! - **Sources** (no parents): [`scan::EntityScanTask`],
//!   [`knn::KnnTask`]
//! - **Unary operators**: [`filter::FilterTask`],
//!   [`projection::ProjectionTask`], [`projection::AggregateTask`],
//!   [`limit::LimitTask`], [`sort::SortTask`]
//!
//! Every task reports a fixed cost estimate (`cost` module constants ×
//! its row estimate); the scheduler surfaces but never reorders on it.

pub mod filter;
pub mod knn;
pub mod limit;
pub mod projection;
pub mod scan;
pub mod sort;

use std::sync::Arc;

use eyre::Result;

use crate::types::Recordset;

/// A node in the execution graph.
pub trait Task: Send + Sync {
    /// Stable operator name for plan rendering and logs.
    fn name(&self) -> &'static str;

    /// Fixed cost estimate for this task.
    fn cost(&self) -> f64;

    /// Consumes the parents' outputs and produces this task's output.
    /// Source tasks receive an empty slice; unary tasks exactly one
    /// input; binary tasks two, in declared parent order.
    fn execute(&self, inputs: &[Arc<Recordset>]) -> Result<Recordset>;
}

/// The single parent input of a unary operator.
pub(crate) fn unary_input<'a>(
    name: &str,
    inputs: &'a [Arc<Recordset>],
) -> Result<&'a Recordset> {
    match inputs {
        [only] => Ok(only),
        other => Err(eyre::eyre!(
            "{} expects exactly one input, got {}",
            name,
            other.len()
        )),
    }
}
