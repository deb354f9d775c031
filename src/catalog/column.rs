//! # Columns and Column Transactions
//!
//! A [`Column`] is a persistent, typed, nullable sequence of values
//! indexed by tuple-id. It owns one [`RecordStore`]; record 1 of that
//! store is the column header (type, size, nullability, row count,
//! timestamps), and every other record is one value payload keyed by its
//! tuple-id.
//!
//! ## Locking
//!
//! Two locks per column:
//!
//! - **global** (`Arc<RwLock<()>>`): guards open/close. Every transaction
//!   holds the read side for its whole lifetime (an owned `arc_lock`
//!   guard captured at construction and released on close: scoped
//!   acquisition on every exit path). `Column::close` takes the write
//!   side, so it waits out live transactions and no transaction can start
//!   on a closed column.
//! - **tx lock** (`Arc<RwLock<RecordStore>>`): many readers or one
//!   writer at transaction granularity. Reads acquire the read side per
//!   operation; the first mutating call of a transaction `try_write`s and
//!   holds the guard until commit or rollback. A writer that cannot get
//!   the write side fails immediately with `TxWriteLockUnavailable`.
//!
//! ## Transaction states
//!
//! `Clean -> Dirty -> Clean` through commit/rollback, `Closed` terminal,
//! and `Error` on a failed store mutation: from `Error` only rollback
//! and close are valid. Dropping a dirty transaction logs a leak and
//! rolls back.
//!
//! ## Header discipline
//!
//! `count` moves by exactly the number of logical insertions/deletions of
//! each call (batches included); `modified` is set to wall-clock time at
//! every mutation. For nullable columns a null insert materializes no
//! payload: the id is preallocated and reads return `Value::Null`.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

use eyre::{Result, WrapErr};
use parking_lot::{ArcRwLockReadGuard, ArcRwLockWriteGuard, RwLock};
use tracing::{debug, warn};
use uuid::Uuid;
use zerocopy::little_endian::{U32, U64};
use zerocopy::{FromBytes, Immutable, IntoBytes, KnownLayout, Unaligned};

use crate::error::DbError;
use crate::storage::{
    RecordStore, Serializer, StoreOptions, HEADER_RECORD_ID, MIN_TUPLE_RECORD_ID,
};
use crate::types::{ColumnDef, DataType, Name, TupleId, Value};

pub const COLUMN_HEADER_SIZE: usize = 32;

/// Wall-clock milliseconds since the epoch.
pub(crate) fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

/// On-disk column header at record-id 1.
#[repr(C)]
#[derive(Debug, Clone, Copy, FromBytes, IntoBytes, Immutable, KnownLayout, Unaligned)]
pub struct ColumnHeader {
    type_tag: u8,
    nullable: u8,
    _reserved: [u8; 2],
    size: U32,
    count: U64,
    created: U64,
    modified: U64,
}

const _: () = assert!(std::mem::size_of::<ColumnHeader>() == COLUMN_HEADER_SIZE);

impl ColumnHeader {
    pub fn new(def: &ColumnDef) -> Self {
        let now = now_millis();
        Self {
            type_tag: def.data_type() as u8,
            nullable: def.nullable() as u8,
            _reserved: [0; 2],
            size: U32::new(def.size() as u32),
            count: U64::new(0),
            created: U64::new(now),
            modified: U64::new(now),
        }
    }

    pub fn data_type(&self) -> Result<DataType, DbError> {
        DataType::try_from(self.type_tag)
    }

    pub fn nullable(&self) -> bool {
        self.nullable != 0
    }

    pub fn size(&self) -> usize {
        self.size.get() as usize
    }

    pub fn count(&self) -> u64 {
        self.count.get()
    }

    pub fn created(&self) -> u64 {
        self.created.get()
    }

    pub fn modified(&self) -> u64 {
        self.modified.get()
    }

    fn adjust_count(&mut self, delta: i64) {
        let count = self.count.get() as i64 + delta;
        self.count = U64::new(count.max(0) as u64);
        self.modified = U64::new(now_millis());
    }
}

struct HeaderSer;

impl Serializer<ColumnHeader> for HeaderSer {
    fn serialize(&self, value: &ColumnHeader) -> Result<Vec<u8>> {
        Ok(value.as_bytes().to_vec())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<ColumnHeader> {
        ColumnHeader::read_from_bytes(bytes)
            .map_err(|e| eyre::eyre!("malformed column header: {:?}", e))
    }
}

/// Value codec bound to one column definition.
#[derive(Clone, Copy)]
struct ValueSer {
    data_type: DataType,
    size: usize,
}

impl Serializer<Value> for ValueSer {
    fn serialize(&self, value: &Value) -> Result<Vec<u8>> {
        Ok(value.encode())
    }

    fn deserialize(&self, bytes: &[u8]) -> Result<Value> {
        Value::decode(bytes, self.data_type, self.size)
    }
}

/// Transaction lifecycle state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxState {
    Clean,
    Dirty,
    Error,
    Closed,
}

/// A persistent typed column backed by one record store.
pub struct Column {
    name: Name,
    def: ColumnDef,
    path: PathBuf,
    global: Arc<RwLock<()>>,
    store: Arc<RwLock<RecordStore>>,
    closed: AtomicBool,
}

impl Column {
    fn store_file(dir: &Path, column_name: &str) -> PathBuf {
        dir.join(format!("col_{}.db", column_name))
    }

    /// Creates the column store under `dir` and commits its header.
    pub fn create(dir: &Path, name: Name, def: ColumnDef, opts: &StoreOptions) -> Result<Arc<Self>> {
        let path = Self::store_file(dir, def.name());
        let mut store = RecordStore::open(&path, opts)
            .wrap_err_with(|| format!("failed to create column store '{}'", path.display()))?;
        let recid = store.put(&ColumnHeader::new(&def), &HeaderSer)?;
        eyre::ensure!(
            recid == HEADER_RECORD_ID,
            "fresh column store allocated header at record {}",
            recid
        );
        store.commit()?;
        debug!(column = %name, path = %path.display(), "column created");
        Ok(Arc::new(Self {
            name,
            def,
            path,
            global: Arc::new(RwLock::new(())),
            store: Arc::new(RwLock::new(store)),
            closed: AtomicBool::new(false),
        }))
    }

    /// Opens an existing column, restoring its definition from the
    /// header record.
    pub fn open(dir: &Path, name: Name, opts: &StoreOptions) -> Result<Arc<Self>> {
        let path = Self::store_file(dir, name.leaf());
        let store = RecordStore::open(&path, opts)
            .wrap_err_with(|| format!("failed to open column store '{}'", path.display()))?;
        let header = store
            .get(HEADER_RECORD_ID, &HeaderSer)?
            .ok_or_else(|| DbError::StorageCorruption {
                path: path.clone(),
                detail: "missing column header record".into(),
            })?;
        let data_type = header.data_type()?;
        let def = if data_type.is_vector() {
            ColumnDef::vector(name.leaf(), data_type, header.size(), header.nullable())
        } else {
            ColumnDef::new(name.leaf(), data_type, header.nullable())
        };
        Ok(Arc::new(Self {
            name,
            def,
            path,
            global: Arc::new(RwLock::new(())),
            store: Arc::new(RwLock::new(store)),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn def(&self) -> &ColumnDef {
        &self.def
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the column. Waits out live transactions (global write
    /// lock), then marks the column closed. Idempotent.
    pub fn close(&self) {
        let _exclusive = self.global.write();
        if !self.closed.swap(true, Ordering::AcqRel) {
            debug!(column = %self.name, "column closed");
        }
    }

    fn value_ser(&self) -> ValueSer {
        ValueSer {
            data_type: self.def.data_type(),
            size: self.def.size(),
        }
    }

    /// Opens a transaction with a caller-supplied id. The transaction
    /// captures the global read lock for its lifetime.
    pub fn new_transaction(
        self: &Arc<Self>,
        readonly: bool,
        tid: Uuid,
    ) -> Result<ColumnTx> {
        if self.is_closed() {
            return Err(DbError::TxDboClosed {
                name: self.name.to_string(),
            }
            .into());
        }
        let global = self.global.read_arc();
        // close() may have slipped in between the check and the lock
        if self.is_closed() {
            return Err(DbError::TxDboClosed {
                name: self.name.to_string(),
            }
            .into());
        }
        Ok(ColumnTx {
            column: Arc::clone(self),
            tid,
            readonly,
            state: TxState::Clean,
            write_guard: None,
            _global: global,
        })
    }
}

impl std::fmt::Debug for Column {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Column")
            .field("name", &self.name.to_string())
            .field("type", &self.def.data_type())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A transactional view over one column.
#[derive(Debug)]
pub struct ColumnTx {
    column: Arc<Column>,
    tid: Uuid,
    readonly: bool,
    state: TxState,
    write_guard: Option<ArcRwLockWriteGuard<parking_lot::RawRwLock, RecordStore>>,
    _global: ArcRwLockReadGuard<parking_lot::RawRwLock, ()>,
}

impl ColumnTx {
    pub fn tid(&self) -> Uuid {
        self.tid
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn is_readonly(&self) -> bool {
        self.readonly
    }

    pub fn column(&self) -> &Arc<Column> {
        &self.column
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            TxState::Closed => Err(DbError::TxClosed.into()),
            TxState::Error => Err(DbError::TxInError.into()),
            _ if self.column.is_closed() => Err(DbError::TxDboClosed {
                name: self.column.name.to_string(),
            }
            .into()),
            _ => Ok(()),
        }
    }

    fn check_tuple_id(tuple_id: TupleId) -> Result<u64> {
        if tuple_id < MIN_TUPLE_RECORD_ID as i64 {
            return Err(DbError::InvalidTupleId { tuple_id }.into());
        }
        Ok(tuple_id as u64)
    }

    /// Runs `f` against the store under the appropriate lock side.
    fn with_store<R>(&self, f: impl FnOnce(&RecordStore) -> Result<R>) -> Result<R> {
        match &self.write_guard {
            Some(guard) => f(guard),
            None => {
                let guard = self.column.store.read();
                f(&guard)
            }
        }
    }

    /// Acquires the tx write lock on first mutation; fails fast when a
    /// sibling writer holds it.
    fn store_mut(&mut self) -> Result<&mut RecordStore> {
        if self.readonly {
            return Err(DbError::TxReadOnly.into());
        }
        if self.write_guard.is_none() {
            let guard = self
                .column
                .store
                .try_write_arc()
                .ok_or(DbError::TxWriteLockUnavailable)?;
            self.write_guard = Some(guard);
        }
        self.state = TxState::Dirty;
        Ok(self.write_guard.as_mut().expect("write guard held"))
    }

    fn read_header(store: &RecordStore, path: &Path) -> Result<ColumnHeader> {
        store
            .get(HEADER_RECORD_ID, &HeaderSer)?
            .ok_or_else(|| {
                DbError::StorageCorruption {
                    path: path.to_path_buf(),
                    detail: "missing column header record".into(),
                }
                .into()
            })
    }

    /// Column header snapshot (count, timestamps).
    pub fn header(&self) -> Result<ColumnHeader> {
        self.check_open()?;
        let path = self.column.path.clone();
        self.with_store(|store| Self::read_header(store, &path))
    }

    /// Number of rows (from the header record).
    pub fn count(&self) -> Result<i64> {
        Ok(self.header()?.count() as i64)
    }

    /// Reads one value; `None` when the id is absent, `Value::Null` when
    /// it is preallocated without payload.
    pub fn read(&self, tuple_id: TupleId) -> Result<Option<Value>> {
        self.check_open()?;
        let recid = Self::check_tuple_id(tuple_id)?;
        let ser = self.column.value_ser();
        self.with_store(|store| {
            if !store.exists(recid) {
                return Ok(None);
            }
            Ok(Some(store.get(recid, &ser)?.unwrap_or(Value::Null)))
        })
    }

    /// Batch read preserving input order.
    pub fn read_all(&self, tuple_ids: &[TupleId]) -> Result<Vec<Option<Value>>> {
        self.check_open()?;
        let ser = self.column.value_ser();
        let ids: Vec<u64> = tuple_ids
            .iter()
            .map(|&t| Self::check_tuple_id(t))
            .collect::<Result<_>>()?;
        self.with_store(|store| {
            ids.iter()
                .map(|&recid| {
                    if !store.exists(recid) {
                        return Ok(None);
                    }
                    Ok(Some(store.get(recid, &ser)?.unwrap_or(Value::Null)))
                })
                .collect()
        })
    }

    /// Live tuple-ids ascending, after validating the header-first
    /// iterator invariant.
    fn scan_ids(store: &RecordStore, path: &Path) -> Result<Vec<u64>> {
        let ids = store.recids();
        if ids.first() != Some(&HEADER_RECORD_ID) {
            return Err(DbError::StorageCorruption {
                path: path.to_path_buf(),
                detail: "header record is not the first iterated id".into(),
            }
            .into());
        }
        Ok(ids[1..].to_vec())
    }

    /// Snapshot of live tuple-ids, ascending.
    pub fn tuple_ids(&self) -> Result<Vec<TupleId>> {
        self.check_open()?;
        let path = self.column.path.clone();
        self.with_store(|store| {
            Ok(Self::scan_ids(store, &path)?
                .into_iter()
                .map(|recid| recid as TupleId)
                .collect())
        })
    }

    /// Applies `f` to every row in ascending tuple-id order.
    pub fn for_each(&self, mut f: impl FnMut(TupleId, Value)) -> Result<()> {
        self.check_open()?;
        let ser = self.column.value_ser();
        let path = self.column.path.clone();
        self.with_store(|store| {
            for recid in Self::scan_ids(store, &path)? {
                let value = store.get(recid, &ser)?.unwrap_or(Value::Null);
                f(recid as TupleId, value);
            }
            Ok(())
        })
    }

    /// Maps every row through `f` in ascending tuple-id order.
    pub fn map<R>(&self, mut f: impl FnMut(TupleId, Value) -> R) -> Result<Vec<R>> {
        let mut out = Vec::new();
        self.for_each(|tid, v| out.push(f(tid, v)))?;
        Ok(out)
    }

    /// Rows passing `p`, in ascending tuple-id order.
    pub fn filter(&self, mut p: impl FnMut(TupleId, &Value) -> bool) -> Result<Vec<(TupleId, Value)>> {
        let mut out = Vec::new();
        self.for_each(|tid, v| {
            if p(tid, &v) {
                out.push((tid, v));
            }
        })?;
        Ok(out)
    }

    /// Partitions the row snapshot across `parallelism` scoped threads.
    /// The snapshot is taken under one lock acquisition, so a writer
    /// cannot interleave mid-scan; threads are joined before return.
    pub fn parallel_for_each(
        &self,
        f: impl Fn(TupleId, &Value) + Send + Sync,
        parallelism: usize,
    ) -> Result<()> {
        self.check_open()?;
        let parallelism = parallelism.max(1);
        let ser = self.column.value_ser();
        let path = self.column.path.clone();
        self.with_store(|store| {
            let ids = Self::scan_ids(store, &path)?;
            if ids.is_empty() {
                return Ok(());
            }
            let chunk = ids.len().div_ceil(parallelism);
            std::thread::scope(|scope| -> Result<()> {
                let mut handles = Vec::new();
                for part in ids.chunks(chunk) {
                    let f = &f;
                    handles.push(scope.spawn(move || -> Result<()> {
                        for &recid in part {
                            let value = store.get(recid, &ser)?.unwrap_or(Value::Null);
                            f(recid as TupleId, &value);
                        }
                        Ok(())
                    }));
                }
                for handle in handles {
                    handle
                        .join()
                        .map_err(|_| eyre::eyre!("parallel scan worker panicked"))??;
                }
                Ok(())
            })
        })
    }

    fn bump_header(store: &mut RecordStore, path: &Path, delta: i64) -> Result<()> {
        let mut header = Self::read_header(store, path)?;
        header.adjust_count(delta);
        store.update(HEADER_RECORD_ID, &header, &HeaderSer)?;
        Ok(())
    }

    /// Marks the transaction failed after a half-applied store mutation.
    fn poison<T>(&mut self, err: eyre::Report) -> Result<T> {
        self.state = TxState::Error;
        Err(err)
    }

    /// Inserts one value, allocating a fresh tuple-id. Null values on a
    /// nullable column reserve the id without materializing a payload.
    pub fn insert(&mut self, value: Value) -> Result<TupleId> {
        self.check_open()?;
        self.column.def.validate(&value)?;
        let ser = self.column.value_ser();
        let path = self.column.path.clone();
        let store = self.store_mut()?;
        let result = (|| -> Result<u64> {
            let recid = if value.is_null() {
                store.preallocate()?
            } else {
                store.put(&value, &ser)?
            };
            Self::bump_header(store, &path, 1)?;
            Ok(recid)
        })();
        match result {
            Ok(recid) => Ok(recid as TupleId),
            Err(e) => self.poison(e),
        }
    }

    /// Inserts at a caller-chosen tuple-id (entity row fan-out).
    pub fn insert_at(&mut self, tuple_id: TupleId, value: Value) -> Result<()> {
        self.check_open()?;
        let recid = Self::check_tuple_id(tuple_id)?;
        self.column.def.validate(&value)?;
        let ser = self.column.value_ser();
        let path = self.column.path.clone();
        let store = self.store_mut()?;
        let result = (|| -> Result<()> {
            if value.is_null() {
                store.preallocate_at(recid)?;
            } else {
                store.put_at(recid, &value, &ser)?;
            }
            Self::bump_header(store, &path, 1)
        })();
        result.or_else(|e| self.poison(e))
    }

    /// Batch insert; the header count moves by exactly the batch size.
    pub fn insert_all(&mut self, values: Vec<Value>) -> Result<Vec<TupleId>> {
        self.check_open()?;
        for value in &values {
            self.column.def.validate(value)?;
        }
        let ser = self.column.value_ser();
        let path = self.column.path.clone();
        let batch = values.len() as i64;
        let store = self.store_mut()?;
        let result = (|| -> Result<Vec<TupleId>> {
            let mut ids = Vec::with_capacity(values.len());
            for value in &values {
                let recid = if value.is_null() {
                    store.preallocate()?
                } else {
                    store.put(value, &ser)?
                };
                ids.push(recid as TupleId);
            }
            Self::bump_header(store, &path, batch)?;
            Ok(ids)
        })();
        result.or_else(|e| self.poison(e))
    }

    /// Replaces the value at an existing tuple-id. A null replacement on
    /// a nullable column demotes the record to a preallocated slot.
    pub fn update(&mut self, tuple_id: TupleId, value: Value) -> Result<()> {
        self.check_open()?;
        let recid = Self::check_tuple_id(tuple_id)?;
        self.column.def.validate(&value)?;
        let ser = self.column.value_ser();
        let path = self.column.path.clone();
        let store = self.store_mut()?;
        let result = (|| -> Result<()> {
            eyre::ensure!(store.exists(recid), "update of unknown tuple id {}", recid);
            if value.is_null() {
                store.preallocate_at(recid)?;
            } else {
                store.put_at(recid, &value, &ser)?;
            }
            Self::bump_header(store, &path, 0)
        })();
        result.or_else(|e| self.poison(e))
    }

    /// Compare-and-update with bit-exact comparison of the stored bytes.
    pub fn compare_and_update(
        &mut self,
        tuple_id: TupleId,
        value: Value,
        expected: &Value,
    ) -> Result<bool> {
        self.check_open()?;
        let recid = Self::check_tuple_id(tuple_id)?;
        self.column.def.validate(&value)?;
        let ser = self.column.value_ser();
        let path = self.column.path.clone();
        let store = self.store_mut()?;
        let result = (|| -> Result<bool> {
            let swapped = store.compare_and_swap(recid, expected, &value, &ser)?;
            if swapped {
                Self::bump_header(store, &path, 0)?;
            }
            Ok(swapped)
        })();
        result.or_else(|e| self.poison(e))
    }

    /// Deletes one row if present; the header count follows the number
    /// of records actually removed.
    pub fn delete(&mut self, tuple_id: TupleId) -> Result<()> {
        self.delete_all(&[tuple_id])
    }

    /// Batch delete; absent ids are skipped and not counted.
    pub fn delete_all(&mut self, tuple_ids: &[TupleId]) -> Result<()> {
        self.check_open()?;
        let ids: Vec<u64> = tuple_ids
            .iter()
            .map(|&t| Self::check_tuple_id(t))
            .collect::<Result<_>>()?;
        let path = self.column.path.clone();
        let store = self.store_mut()?;
        let result = (|| -> Result<()> {
            let mut removed = 0i64;
            for recid in ids {
                if store.exists(recid) {
                    store.delete(recid)?;
                    removed += 1;
                }
            }
            Self::bump_header(store, &path, -removed)
        })();
        result.or_else(|e| self.poison(e))
    }

    /// Makes the pending batch durable and releases the write lock.
    pub fn commit(&mut self) -> Result<()> {
        match self.state {
            TxState::Closed => return Err(DbError::TxClosed.into()),
            TxState::Error => return Err(DbError::TxInError.into()),
            TxState::Clean => return Ok(()),
            TxState::Dirty => {}
        }
        let outcome = self
            .write_guard
            .as_mut()
            .expect("dirty transaction holds the write guard")
            .commit();
        match outcome {
            Ok(()) => {
                self.write_guard = None;
                self.state = TxState::Clean;
                Ok(())
            }
            Err(e) => self.poison(e),
        }
    }

    /// Discards the pending batch and releases the write lock. Valid
    /// from `Dirty` and `Error`.
    pub fn rollback(&mut self) -> Result<()> {
        match self.state {
            TxState::Closed => return Err(DbError::TxClosed.into()),
            TxState::Clean => return Ok(()),
            TxState::Dirty | TxState::Error => {}
        }
        let outcome = match self.write_guard.as_mut() {
            Some(guard) => guard.rollback(),
            None => Ok(()),
        };
        self.write_guard = None;
        match outcome {
            Ok(()) => {
                self.state = TxState::Clean;
                Ok(())
            }
            Err(e) => {
                self.state = TxState::Error;
                Err(e)
            }
        }
    }

    /// Closes the transaction, rolling back first when dirty. Idempotent;
    /// releases the global read lock on drop.
    pub fn close(&mut self) {
        if matches!(self.state, TxState::Dirty | TxState::Error) {
            if let Err(e) = self.rollback() {
                warn!(tid = %self.tid, error = %e, "rollback during close failed");
            }
        }
        self.write_guard = None;
        self.state = TxState::Closed;
    }
}

impl Drop for ColumnTx {
    fn drop(&mut self) {
        if matches!(self.state, TxState::Dirty | TxState::Error) {
            warn!(
                tid = %self.tid,
                column = %self.column.name,
                "transaction leaked while dirty; rolling back"
            );
        }
        self.close();
    }
}
