//! # k-Nearest-Neighbor Primitives
//!
//! The pieces under the kNN execution task: pluggable distance metrics
//! over fixed-width numeric vectors, and bounded top-k selection with
//! deterministic tie-breaking. The parallel scan itself lives in the
//! execution layer (`exec::tasks::knn`), which partitions the tuple-id
//! space into blocks, runs one [`selection::TopK`] per block, and merges.

pub mod distance;
pub mod selection;

pub use distance::Distance;
pub use selection::{Neighbor, TopK};
