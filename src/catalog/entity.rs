//! # Entities
//!
//! An entity is a horizontal record over N columns sharing one tuple-id
//! space. It owns no store of its own: each column persists itself, and
//! the entity's job is coordination: allocating one tuple-id per row and
//! fanning every operation out to its columns inside a bundled
//! transaction.
//!
//! ## Tuple-id allocation
//!
//! The first column is the pivot: a row insert lets the pivot's store
//! allocate the id, then targets every sibling column at that same id
//! (`insert_at`), preallocating where the cell is null. After a
//! successful entity commit every column holds either a value or an
//! allocated null at that tuple-id.
//!
//! ## Bundled commit
//!
//! Commit fans out column by column. The store gives no cross-column
//! atomicity, so on the first failing column commit the entity
//! transaction moves to `Error` and rolls back the columns that have not
//! committed yet.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eyre::{Result, WrapErr};
use hashbrown::HashMap;
use parking_lot::RwLock;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::catalog::column::{Column, ColumnTx, TxState};
use crate::catalog::index::Index;
use crate::error::DbError;
use crate::storage::StoreOptions;
use crate::types::{ColumnDef, Name, Record, Recordset, Row, TupleId, Value};

/// A collection of columns over one tuple-id space.
pub struct Entity {
    name: Name,
    path: PathBuf,
    columns: Vec<Arc<Column>>,
    indexes: RwLock<HashMap<String, Arc<dyn Index>>>,
    closed: AtomicBool,
}

impl Entity {
    /// Creates the entity directory and one column store per definition.
    pub fn create(
        schema_dir: &Path,
        name: Name,
        defs: &[ColumnDef],
        opts: &StoreOptions,
    ) -> Result<Arc<Self>> {
        eyre::ensure!(!defs.is_empty(), "an entity requires at least one column");
        let path = schema_dir.join(name.leaf());
        std::fs::create_dir_all(&path).map_err(|e| DbError::StorageIo {
            path: path.clone(),
            source: e,
        })?;
        let mut columns = Vec::with_capacity(defs.len());
        for def in defs {
            let column_name = Name::Fqn(vec![
                name.to_string(),
                def.name().to_string(),
            ]);
            columns.push(Column::create(&path, column_name, def.clone(), opts)?);
        }
        debug!(entity = %name, columns = defs.len(), "entity created");
        Ok(Arc::new(Self {
            name,
            path,
            columns,
            indexes: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }))
    }

    /// Opens an existing entity given its ordered column names (from the
    /// schema's descriptor record).
    pub fn open(
        schema_dir: &Path,
        name: Name,
        column_names: &[String],
        opts: &StoreOptions,
    ) -> Result<Arc<Self>> {
        let path = schema_dir.join(name.leaf());
        if !path.is_dir() {
            return Err(DbError::StorageCorruption {
                path,
                detail: format!("entity folder for '{}' is missing", name),
            }
            .into());
        }
        let mut columns = Vec::with_capacity(column_names.len());
        for column_name in column_names {
            let fqn = Name::Fqn(vec![name.to_string(), column_name.clone()]);
            columns.push(
                Column::open(&path, fqn, opts)
                    .wrap_err_with(|| format!("opening column '{}' of '{}'", column_name, name))?,
            );
        }
        Ok(Arc::new(Self {
            name,
            path,
            columns,
            indexes: RwLock::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }))
    }

    pub fn name(&self) -> &Name {
        &self.name
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ordered column handles.
    pub fn columns(&self) -> &[Arc<Column>] {
        &self.columns
    }

    /// Ordered column definitions (the entity's row schema).
    pub fn column_defs(&self) -> Vec<ColumnDef> {
        self.columns.iter().map(|c| c.def().clone()).collect()
    }

    pub fn column(&self, name: &str) -> Result<&Arc<Column>> {
        self.columns
            .iter()
            .find(|c| c.def().name() == name)
            .ok_or_else(|| {
                DbError::ColumnDoesNotExist {
                    name: name.to_string(),
                }
                .into()
            })
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    /// Closes the entity and all of its columns. Idempotent.
    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::AcqRel) {
            for column in &self.columns {
                column.close();
            }
            debug!(entity = %self.name, "entity closed");
        }
    }

    /// Registers a secondary index. The registry is in-memory; index
    /// persistence is the responsibility of concrete implementations.
    pub fn add_index(&self, index: Arc<dyn Index>) -> Result<()> {
        let mut indexes = self.indexes.write();
        let key = index.name().leaf().to_string();
        if indexes.contains_key(&key) {
            return Err(DbError::IndexAlreadyExists { name: key }.into());
        }
        indexes.insert(key, index);
        Ok(())
    }

    pub fn drop_index(&self, name: &str) -> Result<()> {
        let mut indexes = self.indexes.write();
        indexes
            .remove(name)
            .map(|_| ())
            .ok_or_else(|| {
                DbError::IndexDoesNotExist {
                    name: name.to_string(),
                }
                .into()
            })
    }

    pub fn index(&self, name: &str) -> Result<Arc<dyn Index>> {
        let indexes = self.indexes.read();
        indexes.get(name).cloned().ok_or_else(|| {
            DbError::IndexDoesNotExist {
                name: name.to_string(),
            }
            .into()
        })
    }

    pub fn list_indexes(&self) -> Vec<String> {
        self.indexes.read().keys().cloned().collect()
    }

    /// Opens a bundled transaction: one column transaction per column.
    pub fn new_transaction(self: &Arc<Self>, readonly: bool, tid: Uuid) -> Result<EntityTx> {
        if self.is_closed() {
            return Err(DbError::TxDboClosed {
                name: self.name.to_string(),
            }
            .into());
        }
        let mut txs = Vec::with_capacity(self.columns.len());
        for column in &self.columns {
            txs.push(column.new_transaction(readonly, tid)?);
        }
        Ok(EntityTx {
            entity: Arc::clone(self),
            txs,
            tid,
            state: TxState::Clean,
        })
    }
}

impl std::fmt::Debug for Entity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Entity")
            .field("name", &self.name.to_string())
            .field("columns", &self.columns.len())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A bundled transaction across all columns of one entity.
#[derive(Debug)]
pub struct EntityTx {
    entity: Arc<Entity>,
    txs: Vec<ColumnTx>,
    tid: Uuid,
    state: TxState,
}

impl EntityTx {
    pub fn tid(&self) -> Uuid {
        self.tid
    }

    pub fn state(&self) -> TxState {
        self.state
    }

    pub fn entity(&self) -> &Arc<Entity> {
        &self.entity
    }

    /// Column transaction by column name (kNN and scan operators drive
    /// single columns through the bundled view).
    pub fn column_tx(&self, name: &str) -> Result<&ColumnTx> {
        let idx = self
            .entity
            .columns
            .iter()
            .position(|c| c.def().name() == name)
            .ok_or_else(|| DbError::ColumnDoesNotExist {
                name: name.to_string(),
            })?;
        Ok(&self.txs[idx])
    }

    fn check_open(&self) -> Result<()> {
        match self.state {
            TxState::Closed => Err(DbError::TxClosed.into()),
            TxState::Error => Err(DbError::TxInError.into()),
            _ => Ok(()),
        }
    }

    /// Number of rows, read off the pivot column.
    pub fn count(&self) -> Result<i64> {
        self.check_open()?;
        self.txs[0].count()
    }

    /// Inserts one row, allocating a single tuple-id used by every
    /// column. Validation runs across all cells before any store is
    /// touched, so a validation failure has no side effects.
    pub fn insert(&mut self, values: Vec<Value>) -> Result<TupleId> {
        self.check_open()?;
        eyre::ensure!(
            values.len() == self.txs.len(),
            "row arity mismatch: {} values for {} columns",
            values.len(),
            self.txs.len()
        );
        for (tx, value) in self.txs.iter().zip(&values) {
            tx.column().def().validate(value)?;
        }

        let mut iter = values.into_iter();
        let pivot_value = iter.next().expect("at least one column");
        let tuple_id = match self.txs[0].insert(pivot_value) {
            Ok(id) => id,
            Err(e) => {
                self.state = TxState::Error;
                return Err(e);
            }
        };
        for (tx, value) in self.txs[1..].iter_mut().zip(iter) {
            if let Err(e) = tx.insert_at(tuple_id, value) {
                self.state = TxState::Error;
                return Err(e);
            }
        }
        Ok(tuple_id)
    }

    /// Reads one row; `None` when the tuple-id is unknown to the pivot.
    pub fn read(&self, tuple_id: TupleId) -> Result<Option<Record>> {
        self.check_open()?;
        let Some(pivot) = self.txs[0].read(tuple_id)? else {
            return Ok(None);
        };
        let mut values = Vec::with_capacity(self.txs.len());
        values.push(pivot);
        for tx in &self.txs[1..] {
            values.push(tx.read(tuple_id)?.unwrap_or(Value::Null));
        }
        Ok(Some(Record::new(
            tuple_id,
            self.entity.column_defs(),
            values,
        )?))
    }

    /// Materializes every row in ascending tuple-id order.
    pub fn scan(&self) -> Result<Recordset> {
        self.check_open()?;
        let defs = self.entity.column_defs();
        let mut out = Recordset::new(defs);
        let ids = self.txs[0].tuple_ids()?;
        for tid in ids {
            let mut values = Vec::with_capacity(self.txs.len());
            for tx in &self.txs {
                values.push(tx.read(tid)?.unwrap_or(Value::Null));
            }
            out.push_row(Row {
                tuple_id: tid,
                values,
            })?;
        }
        Ok(out)
    }

    /// Deletes a tuple-id from every column.
    pub fn delete(&mut self, tuple_id: TupleId) -> Result<()> {
        self.check_open()?;
        for tx in self.txs.iter_mut() {
            if let Err(e) = tx.delete(tuple_id) {
                self.state = TxState::Error;
                return Err(e);
            }
        }
        Ok(())
    }

    /// Commits column by column; on the first failure the entity
    /// transaction enters `Error` and the remaining columns roll back.
    pub fn commit(&mut self) -> Result<()> {
        self.check_open()?;
        for i in 0..self.txs.len() {
            if let Err(e) = self.txs[i].commit() {
                self.state = TxState::Error;
                for tx in self.txs[i + 1..].iter_mut() {
                    if let Err(rollback_err) = tx.rollback() {
                        warn!(
                            tid = %self.tid,
                            error = %rollback_err,
                            "rollback after failed entity commit also failed"
                        );
                    }
                }
                return Err(e).wrap_err_with(|| {
                    format!("entity '{}' commit failed", self.entity.name)
                });
            }
        }
        self.state = TxState::Clean;
        Ok(())
    }

    /// Rolls back every column; reports the first failure.
    pub fn rollback(&mut self) -> Result<()> {
        if self.state == TxState::Closed {
            return Err(DbError::TxClosed.into());
        }
        let mut first_err = None;
        for tx in self.txs.iter_mut() {
            if let Err(e) = tx.rollback() {
                first_err.get_or_insert(e);
            }
        }
        match first_err {
            None => {
                self.state = TxState::Clean;
                Ok(())
            }
            Some(e) => {
                self.state = TxState::Error;
                Err(e)
            }
        }
    }

    /// Closes every column transaction (rolling back dirty ones).
    pub fn close(&mut self) {
        for tx in self.txs.iter_mut() {
            tx.close();
        }
        self.state = TxState::Closed;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::DataType;
    use tempfile::tempdir;

    fn test_entity(dir: &Path) -> Arc<Entity> {
        Entity::create(
            dir,
            Name::parse("s.features").unwrap(),
            &[
                ColumnDef::new("id", DataType::Int8, false),
                ColumnDef::vector("vec", DataType::Float4Vector, 4, false),
                ColumnDef::new("label", DataType::Text, true),
            ],
            &StoreOptions::default(),
        )
        .unwrap()
    }

    #[test]
    fn insert_shares_one_tuple_id() {
        let dir = tempdir().unwrap();
        let entity = test_entity(dir.path());

        let mut tx = entity.new_transaction(false, Uuid::new_v4()).unwrap();
        let tid = tx
            .insert(vec![
                Value::Int8(1),
                Value::Float4Vector(vec![1.0, 0.0, 0.0, 0.0]),
                Value::Null,
            ])
            .unwrap();
        tx.commit().unwrap();

        let record = tx.read(tid).unwrap().unwrap();
        assert_eq!(record.tuple_id, tid);
        assert_eq!(record.value("id"), Some(&Value::Int8(1)));
        assert_eq!(record.value("label"), Some(&Value::Null));

        // every column answers at the same id
        for name in ["id", "vec", "label"] {
            assert!(tx.column_tx(name).unwrap().read(tid).unwrap().is_some());
        }
    }

    #[test]
    fn arity_mismatch_has_no_side_effects() {
        let dir = tempdir().unwrap();
        let entity = test_entity(dir.path());

        let mut tx = entity.new_transaction(false, Uuid::new_v4()).unwrap();
        assert!(tx.insert(vec![Value::Int8(1)]).is_err());
        assert_eq!(tx.state(), TxState::Clean);
        assert_eq!(tx.count().unwrap(), 0);
    }

    #[test]
    fn validation_failure_aborts_whole_row() {
        let dir = tempdir().unwrap();
        let entity = test_entity(dir.path());

        let mut tx = entity.new_transaction(false, Uuid::new_v4()).unwrap();
        // null into the non-nullable vector column
        let err = tx
            .insert(vec![Value::Int8(1), Value::Null, Value::Null])
            .unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DbError>(),
            Some(DbError::NullInNonNullable { .. })
        ));
        assert_eq!(tx.count().unwrap(), 0);
        assert_eq!(tx.state(), TxState::Clean);
    }

    #[test]
    fn scan_returns_rows_in_order() {
        let dir = tempdir().unwrap();
        let entity = test_entity(dir.path());

        let mut tx = entity.new_transaction(false, Uuid::new_v4()).unwrap();
        for i in 0..4 {
            tx.insert(vec![
                Value::Int8(i),
                Value::Float4Vector(vec![i as f32, 0.0, 0.0, 0.0]),
                Value::Text(format!("row{}", i)),
            ])
            .unwrap();
        }
        tx.commit().unwrap();

        let rs = tx.scan().unwrap();
        assert_eq!(rs.len(), 4);
        assert!(rs
            .rows()
            .windows(2)
            .all(|w| w[0].tuple_id < w[1].tuple_id));
        assert_eq!(rs.columns().len(), 3);
    }

    #[test]
    fn delete_removes_from_every_column() {
        let dir = tempdir().unwrap();
        let entity = test_entity(dir.path());

        let mut tx = entity.new_transaction(false, Uuid::new_v4()).unwrap();
        let tid = tx
            .insert(vec![
                Value::Int8(1),
                Value::Float4Vector(vec![0.0; 4]),
                Value::Null,
            ])
            .unwrap();
        tx.commit().unwrap();

        tx.delete(tid).unwrap();
        tx.commit().unwrap();

        assert_eq!(tx.read(tid).unwrap(), None);
        for name in ["id", "vec", "label"] {
            assert!(tx.column_tx(name).unwrap().read(tid).unwrap().is_none());
        }
        assert_eq!(tx.count().unwrap(), 0);
    }

    #[test]
    fn rollback_spans_all_columns() {
        let dir = tempdir().unwrap();
        let entity = test_entity(dir.path());

        let mut tx = entity.new_transaction(false, Uuid::new_v4()).unwrap();
        tx.insert(vec![
            Value::Int8(1),
            Value::Float4Vector(vec![0.0; 4]),
            Value::Null,
        ])
        .unwrap();
        tx.rollback().unwrap();
        tx.close();

        let tx = entity.new_transaction(true, Uuid::new_v4()).unwrap();
        assert_eq!(tx.count().unwrap(), 0);
    }

    #[test]
    fn reopen_restores_columns_in_order() {
        let dir = tempdir().unwrap();
        let tid;
        {
            let entity = test_entity(dir.path());
            let mut tx = entity.new_transaction(false, Uuid::new_v4()).unwrap();
            tid = tx
                .insert(vec![
                    Value::Int8(9),
                    Value::Float4Vector(vec![1.0, 2.0, 3.0, 4.0]),
                    Value::Text("kept".into()),
                ])
                .unwrap();
            tx.commit().unwrap();
            tx.close();
            entity.close();
        }
        let entity = Entity::open(
            dir.path(),
            Name::parse("s.features").unwrap(),
            &["id".into(), "vec".into(), "label".into()],
            &StoreOptions::default(),
        )
        .unwrap();
        let tx = entity.new_transaction(true, Uuid::new_v4()).unwrap();
        let record = tx.read(tid).unwrap().unwrap();
        assert_eq!(record.value("label"), Some(&Value::Text("kept".into())));
        assert_eq!(
            entity
                .column_defs()
                .iter()
                .map(|d| d.name().to_string())
                .collect::<Vec<_>>(),
            vec!["id", "vec", "label"]
        );
    }

    #[test]
    fn closed_entity_rejects_transactions() {
        let dir = tempdir().unwrap();
        let entity = test_entity(dir.path());
        entity.close();
        let err = entity.new_transaction(true, Uuid::new_v4()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DbError>(),
            Some(DbError::TxDboClosed { .. })
        ));
    }
}
