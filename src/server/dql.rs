//! # DQL Service
//!
//! Turns a query request into an execution plan, runs it on the worker
//! pool, and streams the result back as recordset chunks bounded by the
//! configured `message_size`.
//!
//! ## Plan shapes
//!
//! ```text
//! kNN query:        knn-scan ──────────────────────▶ [limit]
//! projection query: entity-scan ▶ [filter] ▶ projection ▶ [sort] ▶ [limit]
//! aggregate query:  entity-scan ▶ [filter] ▶ aggregate
//! ```
//!
//! A kNN request folds the boolean filter into the operator as its
//! pre-filter; its output is the `(tuple-id, distance)` recordset,
//! ascending by distance. Exactly one aggregate may stand as the whole
//! projection; fields and aggregates do not mix.

use std::sync::Arc;

use eyre::{ensure, Result};
use tracing::debug;

use crate::catalog::Catalogue;
use crate::exec::tasks::knn::{KnnTask, QueryVector};
use crate::exec::tasks::projection::{AggregateOp, AggregateTask, ProjectionField, ProjectionTask};
use crate::exec::tasks::{
    filter::FilterTask, limit::LimitTask, scan::EntityScanTask, sort::SortTask,
};
use crate::exec::{CancelFlag, ExecutionPlan, Predicate, WorkerPool};
use crate::knn::Distance;
use crate::types::Recordset;

/// kNN clause of a query.
#[derive(Debug, Clone)]
pub struct KnnSpec {
    pub column: String,
    pub query: QueryVector,
    pub distance: Distance,
    pub k: usize,
    pub parallelism: usize,
}

/// One element of the SELECT list.
#[derive(Debug, Clone)]
pub enum ProjectionElement {
    Field {
        column: String,
        alias: Option<String>,
    },
    Aggregate {
        op: AggregateOp,
        column: Option<String>,
    },
}

/// A parsed query against one entity.
#[derive(Debug, Clone)]
pub struct QueryRequest {
    pub schema: String,
    pub entity: String,
    pub projection: Vec<ProjectionElement>,
    pub filter: Option<Predicate>,
    pub knn: Option<KnnSpec>,
    pub order_by: Option<(String, bool)>,
    pub limit: Option<usize>,
}

impl QueryRequest {
    /// Full scan of an entity (SELECT *).
    pub fn scan(schema: impl Into<String>, entity: impl Into<String>) -> Self {
        Self {
            schema: schema.into(),
            entity: entity.into(),
            projection: Vec::new(),
            filter: None,
            knn: None,
            order_by: None,
            limit: None,
        }
    }
}

/// Data-query operations.
pub struct DqlService {
    catalogue: Arc<Catalogue>,
    pool: Arc<WorkerPool>,
    message_size: usize,
}

impl DqlService {
    pub fn new(catalogue: Arc<Catalogue>, pool: Arc<WorkerPool>, message_size: usize) -> Self {
        Self {
            catalogue,
            pool,
            message_size,
        }
    }

    /// Liveness probe.
    pub fn ping(&self) -> bool {
        !self.catalogue.is_closed()
    }

    /// Builds the task graph for a request.
    pub fn plan(&self, request: &QueryRequest) -> Result<ExecutionPlan> {
        let entity = self
            .catalogue
            .schema(&request.schema)?
            .entity(&request.entity)?;
        let mut plan = ExecutionPlan::new();

        if let Some(knn) = &request.knn {
            ensure!(
                request.projection.is_empty() && request.order_by.is_none(),
                "a kNN query emits (tuple-id, distance) rows; projection and ordering do not apply"
            );
            let task = KnnTask::new(
                entity,
                knn.column.clone(),
                knn.query.clone(),
                knn.distance,
                knn.k,
                knn.parallelism,
                request.filter.clone(),
            )?;
            let mut tail = plan.add_source(Arc::new(task));
            if let Some(limit) = request.limit {
                tail = plan.add_unary(Arc::new(LimitTask::new(limit)), tail)?;
            }
            let _ = tail;
            return Ok(plan);
        }

        let scan = EntityScanTask::new(entity)?;
        let rows = scan.row_estimate();
        let mut tail = plan.add_source(Arc::new(scan));

        if let Some(predicate) = &request.filter {
            tail = plan.add_unary(Arc::new(FilterTask::new(predicate.clone(), rows)), tail)?;
        }

        let aggregates: Vec<_> = request
            .projection
            .iter()
            .filter_map(|e| match e {
                ProjectionElement::Aggregate { op, column } => Some((*op, column.clone())),
                ProjectionElement::Field { .. } => None,
            })
            .collect();

        if !aggregates.is_empty() {
            ensure!(
                aggregates.len() == 1 && aggregates.len() == request.projection.len(),
                "exactly one aggregate may form the projection"
            );
            ensure!(
                request.order_by.is_none() && request.limit.is_none(),
                "ordering and limits do not apply to an aggregate result"
            );
            let (op, column) = aggregates.into_iter().next().expect("one aggregate");
            let task = match column {
                Some(column) => AggregateTask::new(op, column, rows),
                None => AggregateTask::count(rows),
            };
            plan.add_unary(Arc::new(task), tail)?;
            return Ok(plan);
        }

        if !request.projection.is_empty() {
            let fields = request
                .projection
                .iter()
                .map(|e| match e {
                    ProjectionElement::Field { column, alias } => ProjectionField {
                        column: column.clone(),
                        alias: alias.clone(),
                    },
                    ProjectionElement::Aggregate { .. } => unreachable!("handled above"),
                })
                .collect();
            tail = plan.add_unary(Arc::new(ProjectionTask::new(fields, rows)), tail)?;
        }

        if let Some((column, ascending)) = &request.order_by {
            tail = plan.add_unary(
                Arc::new(SortTask::new(column.clone(), *ascending, rows)),
                tail,
            )?;
        }

        if let Some(limit) = request.limit {
            tail = plan.add_unary(Arc::new(LimitTask::new(limit)), tail)?;
        }
        let _ = tail;
        Ok(plan)
    }

    /// Plans and executes a request, returning the result in chunks
    /// each bounded by `message_size` estimated bytes.
    pub fn query(&self, request: &QueryRequest) -> Result<Vec<Recordset>> {
        self.query_with(request, &CancelFlag::new())
    }

    /// As [`query`](Self::query), under an external cancellation flag.
    pub fn query_with(
        &self,
        request: &QueryRequest,
        cancel: &CancelFlag,
    ) -> Result<Vec<Recordset>> {
        let plan = self.plan(request)?;
        debug!(
            schema = %request.schema,
            entity = %request.entity,
            tasks = plan.len(),
            cost = plan.total_cost(),
            "running query"
        );
        let result = self.pool.execute_with(&plan, cancel)?;
        Ok(self.chunk(&result))
    }

    /// Splits a recordset into chunks of at most `message_size`
    /// estimated bytes (at least one row per chunk).
    fn chunk(&self, result: &Recordset) -> Vec<Recordset> {
        if result.is_empty() {
            return vec![Recordset::new(result.columns().to_vec())];
        }
        let per_row = result.estimated_row_bytes().max(1);
        let rows_per_chunk = (self.message_size / per_row).max(1);
        result
            .rows()
            .chunks(rows_per_chunk)
            .map(|rows| Recordset::with_rows(result.columns().to_vec(), rows.to_vec()))
            .collect()
    }
}
