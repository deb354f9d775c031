//! # Column Concurrency Tests
//!
//! The single-writer / many-reader regime at transaction granularity:
//!
//! - parallel readers over a large column observe the pre-transaction
//!   state while a writer has begun but not committed;
//! - a fresh reader after commit observes the new state;
//! - writers that cannot take the tx write lock fail fast instead of
//!   blocking.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use ocelotdb::catalog::Column;
use ocelotdb::error::DbError;
use ocelotdb::storage::StoreOptions;
use ocelotdb::types::{ColumnDef, DataType, Name, Value};
use tempfile::tempdir;
use uuid::Uuid;

fn seeded_column(dir: &std::path::Path, rows: i64) -> Arc<Column> {
    let column = Column::create(
        dir,
        Name::parse("s.e.v").unwrap(),
        ColumnDef::new("v", DataType::Int8, false),
        &StoreOptions::default(),
    )
    .unwrap();
    let mut tx = column.new_transaction(false, Uuid::new_v4()).unwrap();
    tx.insert_all((0..rows).map(Value::Int8).collect()).unwrap();
    tx.commit().unwrap();
    column
}

#[test]
fn readers_see_pre_tx_state_while_writer_open() {
    let dir = tempdir().unwrap();
    let rows = 50_000i64;
    let column = seeded_column(dir.path(), rows);
    let expected: i64 = (0..rows).sum();

    // writer begins but performs no mutation yet
    let writer = column.new_transaction(false, Uuid::new_v4()).unwrap();

    let reader = column.new_transaction(true, Uuid::new_v4()).unwrap();
    let sum = AtomicI64::new(0);
    reader
        .parallel_for_each(
            |_, v| {
                sum.fetch_add(v.as_f64().unwrap() as i64, Ordering::Relaxed);
            },
            4,
        )
        .unwrap();
    assert_eq!(sum.into_inner(), expected);
    assert_eq!(reader.count().unwrap(), rows);
    drop(writer);
}

#[test]
fn fresh_reader_sees_state_after_commit() {
    let dir = tempdir().unwrap();
    let column = seeded_column(dir.path(), 100);

    let mut writer = column.new_transaction(false, Uuid::new_v4()).unwrap();
    writer.insert_all((100..200).map(Value::Int8).collect()).unwrap();
    writer.commit().unwrap();
    drop(writer);

    let reader = column.new_transaction(true, Uuid::new_v4()).unwrap();
    assert_eq!(reader.count().unwrap(), 200);
}

#[test]
fn concurrent_writers_one_wins_one_fails_fast() {
    let dir = tempdir().unwrap();
    let column = seeded_column(dir.path(), 10);

    let outcomes: Vec<bool> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..4)
            .map(|i| {
                let column = Arc::clone(&column);
                scope.spawn(move || {
                    let mut tx = column.new_transaction(false, Uuid::new_v4()).unwrap();
                    match tx.insert(Value::Int8(1000 + i)) {
                        Ok(_) => {
                            tx.commit().unwrap();
                            true
                        }
                        Err(e) => {
                            assert!(matches!(
                                e.downcast_ref::<DbError>(),
                                Some(DbError::TxWriteLockUnavailable)
                            ));
                            false
                        }
                    }
                })
            })
            .collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    let winners = outcomes.iter().filter(|ok| **ok).count();
    assert!(winners >= 1);

    let reader = column.new_transaction(true, Uuid::new_v4()).unwrap();
    assert_eq!(reader.count().unwrap(), 10 + winners as i64);
}

#[test]
fn sequential_writers_all_succeed() {
    let dir = tempdir().unwrap();
    let column = seeded_column(dir.path(), 0);

    for i in 0..5 {
        let mut tx = column.new_transaction(false, Uuid::new_v4()).unwrap();
        tx.insert(Value::Int8(i)).unwrap();
        tx.commit().unwrap();
        tx.close();
    }

    let reader = column.new_transaction(true, Uuid::new_v4()).unwrap();
    assert_eq!(reader.count().unwrap(), 5);
}
