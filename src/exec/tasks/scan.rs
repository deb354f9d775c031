//! # Entity Scan
//!
//! Source task materializing every row of an entity through a read-only
//! bundled transaction. The scan observes the committed state at
//! execution time; a concurrent uncommitted writer is invisible to it.

use std::sync::Arc;

use eyre::Result;
use uuid::Uuid;

use crate::catalog::entity::Entity;
use crate::exec::cost::{operator_cost, COST_DISK_READ};
use crate::exec::tasks::Task;
use crate::types::Recordset;

pub struct EntityScanTask {
    entity: Arc<Entity>,
    rows: u64,
}

impl EntityScanTask {
    pub fn new(entity: Arc<Entity>) -> Result<Self> {
        let rows = {
            let tx = entity.new_transaction(true, Uuid::new_v4())?;
            tx.count()? as u64
        };
        Ok(Self { entity, rows })
    }

    pub fn row_estimate(&self) -> u64 {
        self.rows
    }
}

impl Task for EntityScanTask {
    fn name(&self) -> &'static str {
        "entity_scan"
    }

    fn cost(&self) -> f64 {
        operator_cost(self.rows, COST_DISK_READ)
    }

    fn execute(&self, _inputs: &[Arc<Recordset>]) -> Result<Recordset> {
        let mut tx = self.entity.new_transaction(true, Uuid::new_v4())?;
        let out = tx.scan();
        tx.close();
        out
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::StoreOptions;
    use crate::types::{ColumnDef, DataType, Name, Value};
    use tempfile::tempdir;

    #[test]
    fn scan_emits_committed_rows() {
        let dir = tempdir().unwrap();
        let entity = Entity::create(
            dir.path(),
            Name::parse("s.e").unwrap(),
            &[ColumnDef::new("id", DataType::Int8, false)],
            &StoreOptions::default(),
        )
        .unwrap();

        let mut tx = entity.new_transaction(false, Uuid::new_v4()).unwrap();
        for i in 0..3 {
            tx.insert(vec![Value::Int8(i)]).unwrap();
        }
        tx.commit().unwrap();
        tx.close();

        let task = EntityScanTask::new(Arc::clone(&entity)).unwrap();
        assert_eq!(task.row_estimate(), 3);
        let out = task.execute(&[]).unwrap();
        assert_eq!(out.len(), 3);
        assert!(task.cost() > 0.0);
    }
}
