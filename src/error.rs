//! # Error Taxonomy
//!
//! Fallible paths across the crate return `eyre::Result`. Errors with a
//! contract attached: the kinds a caller is allowed to branch on, and the
//! kinds the RPC boundary must translate into status codes: are raised as
//! typed [`DbError`] values and recovered with
//! `Report::downcast_ref::<DbError>()`. Everything else (I/O context chains,
//! internal invariant failures) stays an anonymous report and maps to
//! `StatusCode::Internal`.
//!
//! ## Policy
//!
//! - Validation failures abort the originating request without side effects.
//! - Storage failures during a mutating commit roll back that commit and
//!   revert the in-memory registry.
//! - Corruption discovered while loading a catalogue or schema closes that
//!   subtree; every subsequent operation on it fails.
//! - Execution errors propagate to descendant tasks as `ParentFailed`.

use std::path::PathBuf;

use thiserror::Error;

/// Coarse status codes surfaced at the RPC boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum StatusCode {
    Ok,
    NotFound,
    AlreadyExists,
    InvalidArgument,
    FailedPrecondition,
    Aborted,
    Internal,
}

/// Typed error kinds with defined cross-layer semantics.
#[derive(Error, Debug)]
pub enum DbError {
    // === Validation ===
    /// The operation requires a simple (single-segment) name.
    #[error("a simple name is required, got '{name}'")]
    SimpleNameRequired { name: String },

    /// Unknown or undecodable type tag.
    #[error("unknown type tag {tag}")]
    UnknownType { tag: u8 },

    /// NULL supplied for a non-nullable column.
    #[error("column '{column}' is not nullable")]
    NullInNonNullable { column: String },

    /// Vector length disagreement.
    #[error("shape mismatch: expected {expected} components, got {actual}")]
    ShapeMismatch { expected: usize, actual: usize },

    /// Value type does not match the column type.
    #[error("type mismatch on column '{column}': expected {expected}, got {actual}")]
    TypeMismatch {
        column: String,
        expected: &'static str,
        actual: &'static str,
    },

    /// Tuple-ids 0 and 1 are reserved and never valid payload.
    #[error("invalid tuple id {tuple_id}")]
    InvalidTupleId { tuple_id: i64 },

    // === Catalog ===
    #[error("schema '{name}' already exists")]
    SchemaAlreadyExists { name: String },

    #[error("schema '{name}' does not exist")]
    SchemaDoesNotExist { name: String },

    #[error("entity '{name}' already exists")]
    EntityAlreadyExists { name: String },

    #[error("entity '{name}' does not exist")]
    EntityDoesNotExist { name: String },

    #[error("column '{name}' does not exist")]
    ColumnDoesNotExist { name: String },

    /// Only the uniform-scan index path is implemented.
    #[error("index type '{kind}' is not supported")]
    IndexUnsupported { kind: &'static str },

    #[error("index '{name}' already exists")]
    IndexAlreadyExists { name: String },

    #[error("index '{name}' does not exist")]
    IndexDoesNotExist { name: String },

    // === Transaction ===
    #[error("transaction is closed")]
    TxClosed,

    #[error("transaction is in error state; only rollback or close are valid")]
    TxInError,

    #[error("transaction is read-only")]
    TxReadOnly,

    /// `try_write` on the column tx lock failed; writers never block.
    #[error("column write lock unavailable")]
    TxWriteLockUnavailable,

    /// The owning database object was closed under the transaction.
    #[error("database object '{name}' is closed")]
    TxDboClosed { name: String },

    // === Storage ===
    #[error("storage I/O failure on '{}'", .path.display())]
    StorageIo {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("store '{}' is locked by another process", .path.display())]
    StorageLocked { path: PathBuf },

    #[error("storage corruption in '{}': {detail}", .path.display())]
    StorageCorruption { path: PathBuf, detail: String },

    // === Execution ===
    #[error("parent task {parent} failed")]
    ParentFailed { parent: usize },

    #[error("task was cancelled before execution")]
    TaskCancelled,

    #[error("task exceeded its deadline")]
    TaskTimeout,

    /// Aggregate over an empty input where no identity exists (mean).
    #[error("aggregate over empty input")]
    EmptyAggregate,
}

impl DbError {
    /// Maps this kind onto the coarse RPC status code.
    pub fn status(&self) -> StatusCode {
        match self {
            DbError::SimpleNameRequired { .. }
            | DbError::UnknownType { .. }
            | DbError::NullInNonNullable { .. }
            | DbError::ShapeMismatch { .. }
            | DbError::TypeMismatch { .. }
            | DbError::InvalidTupleId { .. }
            | DbError::EmptyAggregate => StatusCode::InvalidArgument,

            DbError::SchemaAlreadyExists { .. }
            | DbError::EntityAlreadyExists { .. }
            | DbError::IndexAlreadyExists { .. } => StatusCode::AlreadyExists,

            DbError::SchemaDoesNotExist { .. }
            | DbError::EntityDoesNotExist { .. }
            | DbError::ColumnDoesNotExist { .. }
            | DbError::IndexDoesNotExist { .. } => StatusCode::NotFound,

            DbError::IndexUnsupported { .. }
            | DbError::TxClosed
            | DbError::TxInError
            | DbError::TxReadOnly
            | DbError::TxDboClosed { .. } => StatusCode::FailedPrecondition,

            DbError::TxWriteLockUnavailable
            | DbError::TaskCancelled
            | DbError::TaskTimeout
            | DbError::ParentFailed { .. } => StatusCode::Aborted,

            DbError::StorageIo { .. }
            | DbError::StorageLocked { .. }
            | DbError::StorageCorruption { .. } => StatusCode::Internal,
        }
    }
}

/// Status code for an arbitrary report: typed kinds map through
/// [`DbError::status`], anonymous reports are internal failures.
pub fn status_of(report: &eyre::Report) -> StatusCode {
    report
        .downcast_ref::<DbError>()
        .map(DbError::status)
        .unwrap_or(StatusCode::Internal)
}
