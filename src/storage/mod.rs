//! # Storage Layer
//!
//! The foundational persistence layer: a log-structured [`RecordStore`]
//! per column (and per catalog level), checksummed WAL frames, pluggable
//! read volumes, and exclusive file locking.
//!
//! ## Architecture Overview
//!
//! ```text
//! +--------------------------------------+
//! |  RecordStore (recid -> byte blob)    |
//! |  pending overlay | committed index   |
//! +--------------------------------------+
//! |  wal: frame format + CRC-64 checksum |
//! +--------------------------------------+
//! |  volume: mmap | heap read view       |
//! +--------------------------------------+
//! |  lock: flock with bounded wait       |
//! +--------------------------------------+
//! ```
//!
//! The store is append-only: the write-ahead log *is* the data file, and
//! a Commit frame seals each batch. Durability comes from fsync at
//! commit; atomicity from truncating any unsealed tail at open.
//!
//! ## Reserved ids
//!
//! Record-id 1 ([`HEADER_RECORD_ID`]) addresses the owner's header in
//! every store; id 0 is never valid. Row payload starts at id 2
//! ([`MIN_TUPLE_RECORD_ID`]). Traversals rely on the header being the
//! first id the ascending iterator yields.
//!
//! ## Concurrency
//!
//! A store is not internally synchronized. The column layer wraps it in
//! the transaction `RwLock` (many readers or one writer); the invariant
//! is that a non-empty pending overlay implies exclusive access.

mod lock;
mod store;
mod volume;
mod wal;

pub use lock::FileLock;
pub use store::{
    RecordStore, Serializer, StoreOptions, HEADER_RECORD_ID, MIN_TUPLE_RECORD_ID,
};
pub use volume::{HeapVolume, MmapVolume, Volume, VolumeKind};
pub use wal::{encode_frame, FrameHeader, FrameKind, FRAME_HEADER_SIZE};
