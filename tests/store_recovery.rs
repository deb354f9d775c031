//! # Store Durability Tests
//!
//! The record store's durability contract, exercised across process-like
//! close/reopen cycles:
//!
//! 1. Committed batches survive reopen byte for byte.
//! 2. A crash mid-batch (valid frames with no commit marker, torn
//!    frames) leaves exactly the committed prefix visible after reopen.
//! 3. A corrupted frame that later intact frames follow is reported as
//!    `StorageCorruption`, never silently discarded as a crash tail.
//! 4. Rollback makes every mutation of the batch invisible to later
//!    transactions.

use std::io::Write;

use ocelotdb::catalog::Column;
use ocelotdb::error::DbError;
use ocelotdb::storage::{encode_frame, FrameKind, RecordStore, Serializer, StoreOptions};
use ocelotdb::types::{ColumnDef, DataType, Name, Value};
use tempfile::tempdir;
use uuid::Uuid;

struct BytesSer;

impl Serializer<Vec<u8>> for BytesSer {
    fn serialize(&self, value: &Vec<u8>) -> eyre::Result<Vec<u8>> {
        Ok(value.clone())
    }

    fn deserialize(&self, bytes: &[u8]) -> eyre::Result<Vec<u8>> {
        Ok(bytes.to_vec())
    }
}

mod committed_prefix {
    use super::*;

    #[test]
    fn crash_between_puts_keeps_committed_prefix_only() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("col_data.db");

        let committed: Vec<u64> = {
            let mut store = RecordStore::open(&path, &StoreOptions::default()).unwrap();
            let mut ids = Vec::new();
            for i in 0..100u32 {
                ids.push(store.put(&i.to_le_bytes().to_vec(), &BytesSer).unwrap());
            }
            store.commit().unwrap();
            ids
        };

        // crash simulation: more puts appended, commit never reached
        {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&path)
                .unwrap();
            for i in 0..50u32 {
                let frame = encode_frame(200 + i as u64, FrameKind::Put, &i.to_le_bytes());
                file.write_all(&frame).unwrap();
            }
            // torn frame at the very end
            let torn = encode_frame(999, FrameKind::Put, b"half-written payload");
            file.write_all(&torn[..torn.len() / 2]).unwrap();
            file.sync_all().unwrap();
        }

        let store = RecordStore::open(&path, &StoreOptions::default()).unwrap();
        assert_eq!(store.recids(), committed);
        for (i, recid) in committed.iter().enumerate() {
            let payload = store.get(*recid, &BytesSer).unwrap().unwrap();
            assert_eq!(payload, (i as u32).to_le_bytes().to_vec());
        }
    }

    #[test]
    fn ten_thousand_rows_survive_reopen() {
        let dir = tempdir().unwrap();
        let name = Name::parse("s.e.id").unwrap();
        let def = ColumnDef::new("id", DataType::Int8, false);

        {
            let column =
                Column::create(dir.path(), name.clone(), def, &StoreOptions::default()).unwrap();
            let mut tx = column.new_transaction(false, Uuid::new_v4()).unwrap();
            tx.insert_all((0..10_000).map(Value::Int8).collect()).unwrap();
            tx.commit().unwrap();
        }

        let column = Column::open(dir.path(), name, &StoreOptions::default()).unwrap();
        let tx = column.new_transaction(true, Uuid::new_v4()).unwrap();
        assert_eq!(tx.count().unwrap(), 10_000);
        let mut sum = 0i64;
        tx.for_each(|_, v| sum += v.as_f64().unwrap() as i64).unwrap();
        assert_eq!(sum, (0..10_000i64).sum::<i64>());
    }
}

mod interior_corruption {
    use super::*;

    #[test]
    fn bit_rot_under_a_later_commit_is_reported_not_discarded() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("col_data.db");
        {
            let mut store = RecordStore::open(&path, &StoreOptions::default()).unwrap();
            for i in 0..10u32 {
                store.put(&i.to_le_bytes().to_vec(), &BytesSer).unwrap();
            }
            store.commit().unwrap();
        }

        // damage the second frame's header; the eight frames and the
        // commit marker behind it are untouched
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[30] ^= 0x01;
        std::fs::write(&path, &bytes).unwrap();

        let err = RecordStore::open(&path, &StoreOptions::default()).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DbError>(),
            Some(DbError::StorageCorruption { .. })
        ));
    }

    #[test]
    fn damaged_final_frame_with_nothing_after_is_still_a_tail() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("col_data.db");
        let committed;
        {
            let mut store = RecordStore::open(&path, &StoreOptions::default()).unwrap();
            committed = store.put(&b"keep".to_vec(), &BytesSer).unwrap();
            store.commit().unwrap();
        }
        // append one full-length frame with a flipped payload byte and
        // nothing valid behind it
        {
            let mut file = std::fs::OpenOptions::new()
                .append(true)
                .open(&path)
                .unwrap();
            let mut frame = encode_frame(9, FrameKind::Put, b"lost");
            let last = frame.len() - 1;
            frame[last] ^= 0xFF;
            file.write_all(&frame).unwrap();
            file.sync_all().unwrap();
        }

        let store = RecordStore::open(&path, &StoreOptions::default()).unwrap();
        assert_eq!(store.recids(), vec![committed]);
        assert_eq!(
            store.get(committed, &BytesSer).unwrap(),
            Some(b"keep".to_vec())
        );
    }
}

mod rollback_visibility {
    use super::*;

    #[test]
    fn rolled_back_mutations_invisible_to_later_transactions() {
        let dir = tempdir().unwrap();
        let column = Column::create(
            dir.path(),
            Name::parse("s.e.v").unwrap(),
            ColumnDef::new("v", DataType::Int8, false),
            &StoreOptions::default(),
        )
        .unwrap();

        let keeper = {
            let mut tx = column.new_transaction(false, Uuid::new_v4()).unwrap();
            let tid = tx.insert(Value::Int8(1)).unwrap();
            tx.commit().unwrap();
            tid
        };

        {
            let mut tx = column.new_transaction(false, Uuid::new_v4()).unwrap();
            tx.update(keeper, Value::Int8(99)).unwrap();
            tx.insert(Value::Int8(2)).unwrap();
            tx.delete(keeper).unwrap();
            tx.rollback().unwrap();
        }

        let tx = column.new_transaction(true, Uuid::new_v4()).unwrap();
        assert_eq!(tx.read(keeper).unwrap(), Some(Value::Int8(1)));
        assert_eq!(tx.count().unwrap(), 1);
    }

    #[test]
    fn leaked_dirty_transaction_rolls_back_on_drop() {
        let dir = tempdir().unwrap();
        let column = Column::create(
            dir.path(),
            Name::parse("s.e.v").unwrap(),
            ColumnDef::new("v", DataType::Int8, false),
            &StoreOptions::default(),
        )
        .unwrap();

        {
            let mut tx = column.new_transaction(false, Uuid::new_v4()).unwrap();
            tx.insert(Value::Int8(42)).unwrap();
            // dropped while dirty
        }

        let tx = column.new_transaction(true, Uuid::new_v4()).unwrap();
        assert_eq!(tx.count().unwrap(), 0);
    }
}

mod locking {
    use super::*;
    use std::time::Duration;

    #[test]
    fn second_process_like_open_fails_with_storage_locked() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("col_data.db");
        let opts = StoreOptions {
            lock_timeout: Duration::from_millis(40),
            ..Default::default()
        };

        let _held = RecordStore::open(&path, &opts).unwrap();
        let err = RecordStore::open(&path, &opts).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DbError>(),
            Some(DbError::StorageLocked { .. })
        ));
    }
}
