//! # Fixed Cost Model
//!
//! The engine does not optimize cost-based; every operator reports a
//! fixed estimate of `row_estimate x per-operation constant`, and the
//! constants rank operation classes relative to each other (disk reads
//! dominate, memory traffic is cheap, pure compute sits between). The
//! scheduler surfaces plan cost for observability; it never reorders on
//! it.

/// Relative cost of one in-memory row read.
pub const COST_MEMORY_READ: f64 = 1e-4;

/// Relative cost of one row read that may touch disk.
pub const COST_DISK_READ: f64 = 1e-1;

/// Relative cost of one in-memory row write.
pub const COST_MEMORY_WRITE: f64 = 2e-4;

/// Relative cost of one row's worth of computation.
pub const COST_CPU: f64 = 1e-3;

/// Cost of an operator touching `rows` rows at `per_row` unit cost.
pub fn operator_cost(rows: u64, per_row: f64) -> f64 {
    rows as f64 * per_row
}
