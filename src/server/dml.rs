//! # DML Service
//!
//! Row insertion into entities, one row or batched. Every request runs
//! in its own bundled entity transaction: validation failures abort
//! before any store is touched, and a batch commits atomically per
//! column: either the whole batch lands or none of it does.

use std::sync::Arc;

use eyre::Result;
use uuid::Uuid;

use crate::catalog::Catalogue;
use crate::types::{TupleId, Value};

/// Data-manipulation operations.
pub struct DmlService {
    catalogue: Arc<Catalogue>,
}

impl DmlService {
    pub fn new(catalogue: Arc<Catalogue>) -> Self {
        Self { catalogue }
    }

    /// Inserts one row; returns its tuple-id.
    pub fn insert(&self, schema: &str, entity: &str, values: Vec<Value>) -> Result<TupleId> {
        let ids = self.insert_batch(schema, entity, vec![values])?;
        Ok(ids[0])
    }

    /// Inserts a batch of rows in one transaction; returns their
    /// tuple-ids in input order. A failing row rolls back the batch.
    pub fn insert_batch(
        &self,
        schema: &str,
        entity: &str,
        rows: Vec<Vec<Value>>,
    ) -> Result<Vec<TupleId>> {
        let target = self.catalogue.schema(schema)?.entity(entity)?;
        let mut tx = target.new_transaction(false, Uuid::new_v4())?;
        let mut ids = Vec::with_capacity(rows.len());
        for row in rows {
            match tx.insert(row) {
                Ok(id) => ids.push(id),
                Err(e) => {
                    let _ = tx.rollback();
                    tx.close();
                    return Err(e);
                }
            }
        }
        if let Err(e) = tx.commit() {
            tx.close();
            return Err(e);
        }
        tx.close();
        Ok(ids)
    }
}
