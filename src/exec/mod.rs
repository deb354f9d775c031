//! # Execution Engine
//!
//! Query plans are directed acyclic graphs of tasks scheduled against a
//! bounded worker pool:
//!
//! ```text
//! +-----------------------------------------------+
//! |  plan: arena DAG, TaskId handles              |
//! +-----------------------------------------------+
//! |  scheduler: [core, max] workers, synchronous  |
//! |  handoff, ParentFailed propagation, cancel    |
//! +-----------------------------------------------+
//! |  tasks: scan | knn | filter | projection |    |
//! |         aggregate | sort | limit              |
//! +-----------------------------------------------+
//! |  predicate: boolean row predicates            |
//! |  cost: fixed per-operation constants          |
//! +-----------------------------------------------+
//! ```
//!
//! Data flows between tasks as `Arc<Recordset>`; each task consumes its
//! parents' outputs and emits one recordset, and the root task's output
//! is the query result.

pub mod cost;
pub mod plan;
pub mod predicate;
pub mod scheduler;
pub mod tasks;

pub use plan::{ExecutionPlan, TaskId};
pub use predicate::{compare_values, CompareOp, Predicate};
pub use scheduler::{CancelFlag, WorkerPool};
pub use tasks::Task;
