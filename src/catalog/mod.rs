//! # Catalog Tree
//!
//! The three-level persistent namespace: catalogue -> schema -> entity ->
//! column. Every node is a database object with an `open -> closed`
//! lifecycle: `closed` is terminal and monotonic, close is idempotent
//! and propagates to owned children, and any operation on a closed object
//! fails with `TxDboClosed`.
//!
//! ```text
//! Catalogue          root/catalogue.db
//!  └─ Schema         root/schema_<name>/catalogue.db
//!      └─ Entity     root/schema_<name>/<entity>/
//!          └─ Column root/schema_<name>/<entity>/col_<col>.db
//! ```
//!
//! Children hold no pointer back to their parent; ownership flows
//! strictly downward through `Arc` handles, and registries map names to
//! children under read-write locks.

pub mod catalogue;
pub mod column;
pub mod entity;
pub mod index;
mod meta;
pub mod schema;

pub use catalogue::{Catalogue, CATALOGUE_STORE_FILE};
pub use column::{Column, ColumnHeader, ColumnTx, TxState, COLUMN_HEADER_SIZE};
pub use entity::{Entity, EntityTx};
pub use index::{Index, IndexType, UniformScanIndex};
pub use schema::{Schema, SCHEMA_STORE_FILE};
