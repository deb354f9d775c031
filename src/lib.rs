//! # OcelotDB - Analytical Engine with Native Vector Search
//!
//! OcelotDB is a column-oriented analytical database engine specialized
//! for k-nearest-neighbor similarity search over high-dimensional
//! vectors alongside relational predicates. This implementation
//! prioritizes:
//!
//! - **Durability by construction**: every column store is a
//!   checksummed write-ahead log; commit is an fsync'd marker frame and
//!   crash recovery is a truncation
//! - **Single-writer, many-reader columns**: transactional views with
//!   lock-scoped lifetimes, no finalizer cleanup
//! - **Parallel query execution**: DAG plans over a bounded worker pool
//!   with synchronous handoff
//!
//! ## Quick Start
//!
//! ```ignore
//! use ocelotdb::config::ServerConfig;
//! use ocelotdb::server::Engine;
//! use ocelotdb::types::{ColumnDef, DataType, Value};
//!
//! let engine = Engine::start(ServerConfig::builder().root("./data").build()?)?;
//!
//! engine.ddl().create_schema("warehouse")?;
//! engine.ddl().create_entity("warehouse", "features", &[
//!     ColumnDef::new("id", DataType::Int8, false),
//!     ColumnDef::vector("embedding", DataType::Float4Vector, 128, false),
//! ])?;
//! engine.dml().insert("warehouse", "features", vec![
//!     Value::Int8(1),
//!     Value::Float4Vector(vec![0.0; 128]),
//! ])?;
//! ```
//!
//! ## Architecture
//!
//! ```text
//! +--------------------------------------+
//! |   Services (DDL / DML / DQL)         |
//! +--------------------------------------+
//! |   Execution graph + worker pool      |
//! |   scan | filter | project | knn ...  |
//! +--------------------------------------+
//! |   Catalogue > Schema > Entity >      |
//! |   Column (+ transactions)            |
//! +--------------------------------------+
//! |   Record store (WAL-structured)      |
//! +--------------------------------------+
//! |   Volumes (mmap / heap) + file locks |
//! +--------------------------------------+
//! ```
//!
//! ## File Layout
//!
//! ```text
//! data_dir/
//! ├── catalogue.db                  # root catalog store
//! └── schema_<name>/
//!     ├── catalogue.db              # schema catalog store
//!     └── <entity>/
//!         └── col_<column>.db       # one record store per column
//! ```
//!
//! Record 1 of every store is its owner's header; tuple-ids 0 and 1 are
//! never valid payload.
//!
//! ## Module Overview
//!
//! - [`storage`]: WAL-structured record stores, volumes, file locks
//! - [`catalog`]: the DBO tree: catalogue, schemas, entities, columns
//! - [`types`]: names, data types, values, records, recordsets
//! - [`exec`]: plans, scheduler, operator tasks
//! - [`knn`]: distance kernels and bounded top-k selection
//! - [`server`]: DDL/DML/DQL services and the engine façade
//! - [`config`]: recognized server options
//! - [`error`]: the typed failure taxonomy and status mapping

pub mod catalog;
pub mod config;
pub mod encoding;
pub mod error;
pub mod exec;
pub mod knn;
pub mod server;
pub mod storage;
pub mod types;

pub use catalog::{Catalogue, Column, ColumnTx, Entity, EntityTx, Schema};
pub use config::ServerConfig;
pub use error::{DbError, StatusCode};
pub use server::Engine;
pub use types::{ColumnDef, DataType, Name, Record, Recordset, Value};
