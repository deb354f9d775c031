//! # kNN Operator
//!
//! Parallel top-k selection over a column of fixed-width numeric
//! vectors. The committed tuple-id snapshot is partitioned into `p`
//! roughly equal blocks; each block runs on its own scoped thread with a
//! bounded size-`k` max-heap, and the block heaps merge into the final
//! ascending selection. Ties break toward the lower tuple-id with
//! bit-exact distance comparison.
//!
//! The scan threads share the read side of the column's transaction
//! lock, so the whole operator observes one committed snapshot and is
//! invisible to (and unblocked by) writers that have not yet mutated.
//!
//! An optional boolean pre-filter over the entity's rows restricts the
//! candidate set before any distance is computed.
//!
//! Output: up to `k` rows of a single `distance` Float8 column, the
//! neighbor's tuple-id on each row, ascending by distance.

use std::sync::Arc;

use eyre::Result;
use uuid::Uuid;

use crate::catalog::entity::Entity;
use crate::error::DbError;
use crate::exec::cost::{operator_cost, COST_CPU, COST_DISK_READ};
use crate::exec::predicate::Predicate;
use crate::exec::tasks::Task;
use crate::knn::{Distance, Neighbor, TopK};
use crate::types::{ColumnDef, DataType, Recordset, TupleId, Value};

/// Query vector, matching the column's element type.
#[derive(Debug, Clone)]
pub enum QueryVector {
    Float4(Vec<f32>),
    Float8(Vec<f64>),
}

impl QueryVector {
    fn len(&self) -> usize {
        match self {
            QueryVector::Float4(v) => v.len(),
            QueryVector::Float8(v) => v.len(),
        }
    }

    fn element_type(&self) -> DataType {
        match self {
            QueryVector::Float4(_) => DataType::Float4Vector,
            QueryVector::Float8(_) => DataType::Float8Vector,
        }
    }
}

#[derive(Debug)]
pub struct KnnTask {
    entity: Arc<Entity>,
    column: String,
    query: QueryVector,
    distance: Distance,
    k: usize,
    parallelism: usize,
    predicate: Option<Predicate>,
    rows: u64,
}

impl KnnTask {
    pub fn new(
        entity: Arc<Entity>,
        column: impl Into<String>,
        query: QueryVector,
        distance: Distance,
        k: usize,
        parallelism: usize,
        predicate: Option<Predicate>,
    ) -> Result<Self> {
        eyre::ensure!(k >= 1, "kNN requires k >= 1");
        let column = column.into();
        let def = entity.column(&column)?.def().clone();
        Self::check_shape(&def, &query)?;
        let rows = {
            let tx = entity.new_transaction(true, Uuid::new_v4())?;
            tx.count()? as u64
        };
        Ok(Self {
            entity,
            column,
            query,
            distance,
            k,
            parallelism: parallelism.max(1),
            predicate,
            rows,
        })
    }

    fn check_shape(def: &ColumnDef, query: &QueryVector) -> Result<()> {
        if !def.data_type().is_knn_searchable() {
            return Err(DbError::TypeMismatch {
                column: def.name().to_string(),
                expected: "float or double vector",
                actual: def.data_type().type_name(),
            }
            .into());
        }
        if def.data_type() != query.element_type() {
            return Err(DbError::TypeMismatch {
                column: def.name().to_string(),
                expected: def.data_type().type_name(),
                actual: query.element_type().type_name(),
            }
            .into());
        }
        if query.len() != def.size() {
            return Err(DbError::ShapeMismatch {
                expected: def.size(),
                actual: query.len(),
            }
            .into());
        }
        Ok(())
    }

    fn candidate_distance(&self, value: &Value) -> Result<Option<f64>> {
        match (value, &self.query) {
            (Value::Null, _) => Ok(None),
            (Value::Float4Vector(v), QueryVector::Float4(q)) => {
                Ok(Some(self.distance.between_f32(v, q)))
            }
            (Value::Float8Vector(v), QueryVector::Float8(q)) => {
                Ok(Some(self.distance.between_f64(v, q)))
            }
            (other, _) => Err(DbError::TypeMismatch {
                column: self.column.clone(),
                expected: self.query.element_type().type_name(),
                actual: other
                    .data_type()
                    .map(|t| t.type_name())
                    .unwrap_or("null"),
            }
            .into()),
        }
    }
}

impl Task for KnnTask {
    fn name(&self) -> &'static str {
        "knn"
    }

    fn cost(&self) -> f64 {
        operator_cost(self.rows, COST_DISK_READ + COST_CPU)
    }

    fn execute(&self, _inputs: &[Arc<Recordset>]) -> Result<Recordset> {
        let tx = self.entity.new_transaction(true, Uuid::new_v4())?;
        let col_tx = tx.column_tx(&self.column)?;

        let candidates: Vec<TupleId> = match &self.predicate {
            None => col_tx.tuple_ids()?,
            Some(predicate) => {
                let rows = tx.scan()?;
                let mut passing = Vec::new();
                for row in rows.iter() {
                    if predicate.evaluate(rows.columns(), row)? {
                        passing.push(row.tuple_id);
                    }
                }
                passing
            }
        };

        let mut result = TopK::new(self.k);
        if !candidates.is_empty() {
            let block = candidates.len().div_ceil(self.parallelism).max(1);
            let heaps = std::thread::scope(|scope| -> Result<Vec<TopK>> {
                let mut handles = Vec::new();
                for chunk in candidates.chunks(block) {
                    handles.push(scope.spawn(move || -> Result<TopK> {
                        let mut topk = TopK::new(self.k);
                        for &tuple_id in chunk {
                            let Some(value) = col_tx.read(tuple_id)? else {
                                continue;
                            };
                            if let Some(distance) = self.candidate_distance(&value)? {
                                topk.offer(Neighbor::new(tuple_id, distance));
                            }
                        }
                        Ok(topk)
                    }));
                }
                handles
                    .into_iter()
                    .map(|h| {
                        h.join()
                            .map_err(|_| eyre::eyre!("knn scan worker panicked"))?
                    })
                    .collect()
            })?;
            for heap in heaps {
                result.merge(heap);
            }
        }

        let mut out = Recordset::new(vec![ColumnDef::new("distance", DataType::Float8, false)]);
        for neighbor in result.into_sorted() {
            out.push(neighbor.tuple_id, vec![Value::Float8(neighbor.distance)])?;
        }
        Ok(out)
    }
}
