//! # Record Store
//!
//! A persistent map from `u64` record-ids to opaque byte blobs, with
//! per-record serializers supplied by callers. The store is
//! log-structured: every mutation appends one checksummed frame (see
//! [`super::wal`]) and a Commit frame seals the batch, so the recovery
//! protocol on open replays exactly the committed prefix and truncates
//! any interrupted tail. Damage that intact frames follow is corruption
//! inside once-durable data, not a tail, and fails the open.
//!
//! ## Transactionality
//!
//! One uncommitted batch at a time. Mutations accumulate in a pending
//! overlay visible to the mutator's own reads; `commit` fsyncs and
//! publishes the overlay into the committed index; `rollback` truncates
//! the file back to the last commit point. The store is not internally
//! synchronized: the column layer serializes access through its
//! transaction locks, and the invariant readers rely on is: *a non-empty
//! pending overlay implies the caller holds the store exclusively*.
//!
//! ## Read View
//!
//! Appends go through the store's own file handle; the read volume is
//! refreshed lazily on the first read after an append (double-checked
//! under the view lock), so bulk insert batches pay one remap instead of
//! one per record.
//!
//! ## Record-id discipline
//!
//! Ids are allocated monotonically starting at 1. Id 1 is reserved by the
//! owning object for its header record; payload ids start at 2. Id 0 is
//! never valid. `put_at`/`preallocate_at` let the entity layer target the
//! same tuple-id across sibling columns; they bump the allocator past the
//! targeted id.

use std::fs::{File, OpenOptions};
use std::io::{BufReader, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use eyre::{ensure, Result, WrapErr};
use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};

use crate::config::VolumeKind;
use crate::error::DbError;
use crate::storage::lock::FileLock;
use crate::storage::volume::Volume;
use crate::storage::wal::{
    contains_valid_frame, corrupt, encode_frame, FrameHeader, FrameKind, FRAME_HEADER_SIZE,
};

/// Reserved record-id of the owner's header record.
pub const HEADER_RECORD_ID: u64 = 1;

/// Smallest record-id valid as row payload.
pub const MIN_TUPLE_RECORD_ID: u64 = 2;

/// Caller-supplied codec for one record kind.
pub trait Serializer<T> {
    fn serialize(&self, value: &T) -> Result<Vec<u8>>;
    fn deserialize(&self, bytes: &[u8]) -> Result<T>;
}

/// Open-time options, derived from server config.
#[derive(Debug, Clone)]
pub struct StoreOptions {
    pub lock_timeout: Duration,
    pub volume_kind: VolumeKind,
}

impl Default for StoreOptions {
    fn default() -> Self {
        Self {
            lock_timeout: Duration::from_millis(1000),
            volume_kind: VolumeKind::Mmap,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Slot {
    /// Materialized payload at `offset` (past the frame header).
    Data { offset: u64, len: u32 },
    /// Reserved id without payload.
    Preallocated,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PendingSlot {
    Data { offset: u64, len: u32 },
    Preallocated,
    Deleted,
}

/// Log-structured persistent record map.
pub struct RecordStore {
    path: PathBuf,
    file: File,
    volume: RwLock<Box<dyn Volume>>,
    view_stale: AtomicBool,
    _lock: FileLock,
    committed: HashMap<u64, Slot>,
    pending: HashMap<u64, PendingSlot>,
    commit_offset: u64,
    append_offset: u64,
    next_recid: u64,
    committed_next_recid: u64,
}

impl RecordStore {
    /// Opens (or creates) the store at `path`, replaying the committed
    /// prefix and truncating any interrupted tail.
    pub fn open(path: &Path, opts: &StoreOptions) -> Result<Self> {
        let lock = FileLock::acquire(path, opts.lock_timeout)?;

        let mut file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(path)
            .map_err(|e| DbError::StorageIo {
                path: path.to_path_buf(),
                source: e,
            })?;

        let (committed, commit_offset, next_recid) = Self::replay(path, &mut file)?;

        let file_len = file
            .metadata()
            .map_err(|e| DbError::StorageIo {
                path: path.to_path_buf(),
                source: e,
            })?
            .len();
        if file_len > commit_offset {
            warn!(
                path = %path.display(),
                discarded = file_len - commit_offset,
                "discarding uncommitted store tail"
            );
            file.set_len(commit_offset).map_err(|e| DbError::StorageIo {
                path: path.to_path_buf(),
                source: e,
            })?;
        }
        file.seek(SeekFrom::End(0)).wrap_err("seek to store end")?;

        let volume = opts.volume_kind.open(&file)?;

        debug!(
            path = %path.display(),
            records = committed.len(),
            next_recid,
            "record store opened"
        );

        Ok(Self {
            path: path.to_path_buf(),
            file,
            volume: RwLock::new(volume),
            view_stale: AtomicBool::new(false),
            _lock: lock,
            committed,
            pending: HashMap::new(),
            commit_offset,
            append_offset: commit_offset,
            next_recid,
            committed_next_recid: next_recid,
        })
    }

    /// Scans the log, folding staged frames into the committed index at
    /// every Commit marker. Returns (index, committed length, allocator).
    ///
    /// An invalid frame ends the scan; whether it is a crash tail or
    /// corruption depends on what follows it. A crash tears only the
    /// last append, so any well-formed frame past the damage means the
    /// invalid bytes sit inside data that was once durable, and replay
    /// fails with `StorageCorruption` instead of letting the caller
    /// truncate it away.
    fn replay(path: &Path, file: &mut File) -> Result<(HashMap<u64, Slot>, u64, u64)> {
        file.seek(SeekFrom::Start(0)).wrap_err("seek to store start")?;

        let mut committed: HashMap<u64, Slot> = HashMap::new();
        let mut staged: Vec<(u64, Option<Slot>)> = Vec::new();
        let mut offset = 0u64;
        let mut commit_offset = 0u64;
        let mut next_recid = HEADER_RECORD_ID;
        let mut committed_next = next_recid;
        let mut invalid_frame = false;

        {
            let mut reader = BufReader::new(&mut *file);
            let mut header_buf = [0u8; FRAME_HEADER_SIZE];
            loop {
                match reader.read_exact(&mut header_buf) {
                    Ok(()) => {}
                    Err(e) if e.kind() == std::io::ErrorKind::UnexpectedEof => break,
                    Err(e) => {
                        return Err(DbError::StorageIo {
                            path: path.to_path_buf(),
                            source: e,
                        }
                        .into())
                    }
                }
                let header = *FrameHeader::parse(&header_buf)?;
                let payload_len = header.payload_len();
                let mut payload = vec![0u8; payload_len];
                if reader.read_exact(&mut payload).is_err() {
                    invalid_frame = true;
                    break;
                }
                if !header.validate(&payload) {
                    invalid_frame = true;
                    break;
                }

                let payload_offset = offset + FRAME_HEADER_SIZE as u64;
                offset = payload_offset + payload_len as u64;

                match header.kind().expect("validated frame has a kind") {
                    FrameKind::Put => {
                        staged.push((
                            header.recid(),
                            Some(Slot::Data {
                                offset: payload_offset,
                                len: payload_len as u32,
                            }),
                        ));
                        next_recid = next_recid.max(header.recid() + 1);
                    }
                    FrameKind::Prealloc => {
                        staged.push((header.recid(), Some(Slot::Preallocated)));
                        next_recid = next_recid.max(header.recid() + 1);
                    }
                    FrameKind::Delete => {
                        staged.push((header.recid(), None));
                    }
                    FrameKind::Commit => {
                        for (recid, slot) in staged.drain(..) {
                            match slot {
                                Some(s) => {
                                    committed.insert(recid, s);
                                }
                                None => {
                                    committed.remove(&recid);
                                }
                            }
                        }
                        commit_offset = offset;
                        committed_next = next_recid;
                    }
                }
            }
        }

        // `offset` is where the invalid frame starts; probe everything
        // past its first byte for a surviving frame
        if invalid_frame {
            file.seek(SeekFrom::Start(offset + 1))
                .wrap_err("seek past invalid frame")?;
            let mut rest = Vec::new();
            file.read_to_end(&mut rest).map_err(|e| DbError::StorageIo {
                path: path.to_path_buf(),
                source: e,
            })?;
            if contains_valid_frame(&rest) {
                return Err(corrupt(
                    path,
                    format!("invalid frame at offset {} precedes intact frames", offset),
                ));
            }
        }

        Ok((committed, commit_offset, committed_next))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// True while an uncommitted batch exists.
    pub fn is_dirty(&self) -> bool {
        !self.pending.is_empty()
    }

    /// Number of committed records, the header included if present.
    pub fn committed_len(&self) -> usize {
        self.committed.len()
    }

    fn io_err(&self, e: std::io::Error) -> eyre::Report {
        DbError::StorageIo {
            path: self.path.clone(),
            source: e,
        }
        .into()
    }

    fn append_frame(&mut self, recid: u64, kind: FrameKind, payload: &[u8]) -> Result<u64> {
        let frame = encode_frame(recid, kind, payload);
        self.file.write_all(&frame).map_err(|e| self.io_err(e))?;
        let payload_offset = self.append_offset + FRAME_HEADER_SIZE as u64;
        self.append_offset += frame.len() as u64;
        self.view_stale.store(true, Ordering::Release);
        Ok(payload_offset)
    }

    /// Rebuilds the read view if an append landed since the last read.
    fn ensure_view(&self) -> Result<()> {
        if self.view_stale.load(Ordering::Acquire) {
            let mut volume = self.volume.write();
            if self.view_stale.load(Ordering::Acquire) {
                volume.refresh(&self.file)?;
                self.view_stale.store(false, Ordering::Release);
            }
        }
        Ok(())
    }

    fn alloc_recid(&mut self) -> u64 {
        let recid = self.next_recid;
        self.next_recid += 1;
        recid
    }

    /// Stores a new record and returns its id.
    pub fn put<T>(&mut self, value: &T, ser: &dyn Serializer<T>) -> Result<u64> {
        let recid = self.alloc_recid();
        self.put_raw_at(recid, &ser.serialize(value)?)?;
        Ok(recid)
    }

    /// Stores a record at a caller-chosen id (entity tuple-id fan-out).
    pub fn put_at<T>(&mut self, recid: u64, value: &T, ser: &dyn Serializer<T>) -> Result<()> {
        ensure!(recid != 0, "record id 0 is never valid");
        self.next_recid = self.next_recid.max(recid + 1);
        self.put_raw_at(recid, &ser.serialize(value)?)
    }

    fn put_raw_at(&mut self, recid: u64, payload: &[u8]) -> Result<()> {
        let offset = self.append_frame(recid, FrameKind::Put, payload)?;
        self.pending.insert(
            recid,
            PendingSlot::Data {
                offset,
                len: payload.len() as u32,
            },
        );
        Ok(())
    }

    /// Reserves an id without materializing a payload.
    pub fn preallocate(&mut self) -> Result<u64> {
        let recid = self.alloc_recid();
        self.append_frame(recid, FrameKind::Prealloc, &[])?;
        self.pending.insert(recid, PendingSlot::Preallocated);
        Ok(recid)
    }

    /// Reserves a caller-chosen id (null cells in an entity row).
    pub fn preallocate_at(&mut self, recid: u64) -> Result<()> {
        ensure!(recid != 0, "record id 0 is never valid");
        self.next_recid = self.next_recid.max(recid + 1);
        self.append_frame(recid, FrameKind::Prealloc, &[])?;
        self.pending.insert(recid, PendingSlot::Preallocated);
        Ok(())
    }

    /// Updates an existing (or preallocated) record in place.
    pub fn update<T>(&mut self, recid: u64, value: &T, ser: &dyn Serializer<T>) -> Result<()> {
        ensure!(
            self.exists(recid),
            "update of non-existent record {}",
            recid
        );
        self.put_raw_at(recid, &ser.serialize(value)?)
    }

    /// Replaces the record only if its stored bytes equal the serialized
    /// `expected` value. Comparison is bit-exact.
    pub fn compare_and_swap<T>(
        &mut self,
        recid: u64,
        expected: &T,
        new: &T,
        ser: &dyn Serializer<T>,
    ) -> Result<bool> {
        let expected_bytes = ser.serialize(expected)?;
        match self.record_bytes(recid)? {
            Some(bytes) if bytes == expected_bytes => {
                let payload = ser.serialize(new)?;
                self.put_raw_at(recid, &payload)?;
                Ok(true)
            }
            _ => Ok(false),
        }
    }

    /// Removes a record. Deleting an absent id still logs the frame,
    /// keeping replay deterministic.
    pub fn delete(&mut self, recid: u64) -> Result<()> {
        self.append_frame(recid, FrameKind::Delete, &[])?;
        self.pending.insert(recid, PendingSlot::Deleted);
        Ok(())
    }

    /// True if the id maps to a payload or a preallocated slot.
    pub fn exists(&self, recid: u64) -> bool {
        match self.pending.get(&recid) {
            Some(PendingSlot::Deleted) => false,
            Some(_) => true,
            None => self.committed.contains_key(&recid),
        }
    }

    /// Raw stored bytes; `None` for absent or preallocated records.
    pub fn record_bytes(&self, recid: u64) -> Result<Option<Vec<u8>>> {
        let slot = match self.pending.get(&recid) {
            Some(PendingSlot::Deleted) | Some(PendingSlot::Preallocated) => return Ok(None),
            Some(PendingSlot::Data { offset, len }) => (*offset, *len),
            None => match self.committed.get(&recid) {
                Some(Slot::Data { offset, len }) => (*offset, *len),
                Some(Slot::Preallocated) | None => return Ok(None),
            },
        };
        self.ensure_view()?;
        let volume = self.volume.read();
        let bytes = volume
            .slice(slot.0, slot.1 as usize)
            .map_err(|e| corrupt(&self.path, format!("record {}: {}", recid, e)))?;
        Ok(Some(bytes.into_owned()))
    }

    /// Reads and deserializes a record. `None` for absent/preallocated.
    pub fn get<T>(&self, recid: u64, ser: &dyn Serializer<T>) -> Result<Option<T>> {
        match self.record_bytes(recid)? {
            Some(bytes) => {
                let value = ser
                    .deserialize(&bytes)
                    .map_err(|e| corrupt(&self.path, format!("record {}: {}", recid, e)))?;
                Ok(Some(value))
            }
            None => Ok(None),
        }
    }

    /// All live record-ids, ascending. The header record (id 1) is always
    /// first when present: traversals depend on that.
    pub fn recids(&self) -> Vec<u64> {
        let mut ids = Vec::with_capacity(self.committed.len() + self.pending.len());
        for &id in self.committed.keys() {
            if !matches!(self.pending.get(&id), Some(PendingSlot::Deleted)) {
                ids.push(id);
            }
        }
        for (&id, slot) in self.pending.iter() {
            if !matches!(slot, PendingSlot::Deleted) && !self.committed.contains_key(&id) {
                ids.push(id);
            }
        }
        ids.sort_unstable();
        ids
    }

    /// Seals the pending batch: fsync, then publish the overlay.
    pub fn commit(&mut self) -> Result<()> {
        self.append_frame(0, FrameKind::Commit, &[])?;
        self.file.sync_all().map_err(|e| self.io_err(e))?;
        for (recid, slot) in self.pending.drain() {
            match slot {
                PendingSlot::Data { offset, len } => {
                    self.committed.insert(recid, Slot::Data { offset, len });
                }
                PendingSlot::Preallocated => {
                    self.committed.insert(recid, Slot::Preallocated);
                }
                PendingSlot::Deleted => {
                    self.committed.remove(&recid);
                }
            }
        }
        self.commit_offset = self.append_offset;
        self.committed_next_recid = self.next_recid;
        debug!(path = %self.path.display(), "store commit");
        Ok(())
    }

    /// Closes the store, rolling back any uncommitted batch first. The
    /// file lock releases with the handle.
    pub fn close(mut self) -> Result<()> {
        if self.is_dirty() {
            self.rollback()?;
        }
        Ok(())
    }

    /// Discards the pending batch and truncates the log to the last
    /// commit point.
    pub fn rollback(&mut self) -> Result<()> {
        self.pending.clear();
        self.file
            .set_len(self.commit_offset)
            .map_err(|e| self.io_err(e))?;
        self.file.seek(SeekFrom::End(0)).wrap_err("seek after truncate")?;
        self.append_offset = self.commit_offset;
        self.next_recid = self.committed_next_recid;
        self.volume.write().refresh(&self.file)?;
        self.view_stale.store(false, Ordering::Release);
        debug!(path = %self.path.display(), "store rollback");
        Ok(())
    }
}

impl Drop for RecordStore {
    fn drop(&mut self) {
        if self.is_dirty() {
            warn!(
                path = %self.path.display(),
                "record store dropped with uncommitted batch; rolling back"
            );
            let _ = self.rollback();
        }
    }
}

impl std::fmt::Debug for RecordStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RecordStore")
            .field("path", &self.path)
            .field("committed", &self.committed.len())
            .field("pending", &self.pending.len())
            .field("next_recid", &self.next_recid)
            .finish()
    }
}
