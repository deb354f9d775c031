//! # End-to-End Query Pipeline Tests
//!
//! The full stack through the engine façade: DDL to create the
//! namespace, DML to land rows, DQL plans executed on the worker pool.
//! Also the failure path: a plan whose source task fails must report
//! `ParentFailed` for every descendant and surface a single error.

use std::sync::Arc;
use std::time::Duration;

use ocelotdb::config::ServerConfig;
use ocelotdb::error::{status_of, DbError, StatusCode};
use ocelotdb::exec::tasks::projection::AggregateOp;
use ocelotdb::exec::tasks::scan::EntityScanTask;
use ocelotdb::exec::tasks::limit::LimitTask;
use ocelotdb::exec::{ExecutionPlan, WorkerPool};
use ocelotdb::knn::Distance;
use ocelotdb::server::{Engine, KnnSpec, ProjectionElement, QueryRequest};
use ocelotdb::types::{ColumnDef, DataType, Recordset, Value};
use ocelotdb::exec::tasks::knn::QueryVector;
use tempfile::tempdir;

fn engine(root: &std::path::Path) -> Engine {
    Engine::start(
        ServerConfig::builder()
            .root(root)
            .core_threads(2)
            .max_threads(4)
            .keep_alive(Duration::from_millis(500))
            .build()
            .unwrap(),
    )
    .unwrap()
}

fn rows(chunks: Vec<Recordset>) -> Vec<ocelotdb::types::Row> {
    chunks.into_iter().flat_map(|c| c.rows().to_vec()).collect()
}

#[test]
fn knn_query_finds_nearest_row() {
    let dir = tempdir().unwrap();
    let engine = engine(dir.path());

    engine.ddl().create_schema("s1").unwrap();
    engine
        .ddl()
        .create_entity(
            "s1",
            "e1",
            &[
                ColumnDef::new("id", DataType::Int8, false),
                ColumnDef::vector("vec", DataType::Float4Vector, 4, false),
            ],
        )
        .unwrap();

    let first = engine
        .dml()
        .insert(
            "s1",
            "e1",
            vec![
                Value::Int8(1),
                Value::Float4Vector(vec![1.0, 0.0, 0.0, 0.0]),
            ],
        )
        .unwrap();
    engine
        .dml()
        .insert(
            "s1",
            "e1",
            vec![
                Value::Int8(2),
                Value::Float4Vector(vec![0.0, 1.0, 0.0, 0.0]),
            ],
        )
        .unwrap();

    let request = QueryRequest {
        knn: Some(KnnSpec {
            column: "vec".into(),
            query: QueryVector::Float4(vec![1.0, 0.0, 0.0, 0.0]),
            distance: Distance::L2,
            k: 1,
            parallelism: 2,
        }),
        ..QueryRequest::scan("s1", "e1")
    };
    let result = rows(engine.dql().query(&request).unwrap());
    assert_eq!(result.len(), 1);
    assert_eq!(result[0].tuple_id, first);
    assert_eq!(result[0].values[0], Value::Float8(0.0));

    engine.shutdown();
}

#[test]
fn aggregate_and_filter_through_the_pool() {
    let dir = tempdir().unwrap();
    let engine = engine(dir.path());

    engine.ddl().create_schema("s1").unwrap();
    engine
        .ddl()
        .create_entity(
            "s1",
            "e1",
            &[ColumnDef::new("id", DataType::Int8, false)],
        )
        .unwrap();
    engine
        .dml()
        .insert_batch(
            "s1",
            "e1",
            (0..50).map(|i| vec![Value::Int8(i)]).collect(),
        )
        .unwrap();

    let request = QueryRequest {
        projection: vec![ProjectionElement::Aggregate {
            op: AggregateOp::Sum,
            column: Some("id".into()),
        }],
        ..QueryRequest::scan("s1", "e1")
    };
    let result = rows(engine.dql().query(&request).unwrap());
    assert_eq!(result[0].values[0], Value::Float8((0..50).sum::<i64>() as f64));
}

#[test]
fn failing_source_cascades_parent_failed() {
    let dir = tempdir().unwrap();
    let engine = engine(dir.path());

    engine.ddl().create_schema("s1").unwrap();
    engine
        .ddl()
        .create_entity(
            "s1",
            "e1",
            &[ColumnDef::new("id", DataType::Int8, false)],
        )
        .unwrap();

    let entity = engine
        .catalogue()
        .schema("s1")
        .unwrap()
        .entity("e1")
        .unwrap();
    let scan = EntityScanTask::new(Arc::clone(&entity)).unwrap();

    let mut plan = ExecutionPlan::new();
    let source = plan.add_source(Arc::new(scan));
    let mid = plan.add_unary(Arc::new(LimitTask::new(10)), source).unwrap();
    plan.add_unary(Arc::new(LimitTask::new(5)), mid).unwrap();

    // closing the entity makes the source fail at execution time
    entity.close();

    let pool = WorkerPool::new(2, 4, Duration::from_millis(500));
    let err = pool.execute(&plan).unwrap_err();
    assert!(matches!(
        err.downcast_ref::<DbError>(),
        Some(DbError::ParentFailed { .. })
    ));
}

#[test]
fn error_status_codes_at_the_boundary() {
    let dir = tempdir().unwrap();
    let engine = engine(dir.path());

    let err = engine
        .dql()
        .query(&QueryRequest::scan("ghost", "e1"))
        .unwrap_err();
    assert_eq!(status_of(&err), StatusCode::NotFound);

    engine.ddl().create_schema("s1").unwrap();
    let err = engine.ddl().create_schema("s1").unwrap_err();
    assert_eq!(status_of(&err), StatusCode::AlreadyExists);
}

#[test]
fn catalogue_survives_engine_restart() {
    let dir = tempdir().unwrap();
    {
        let engine = engine(dir.path());
        engine.ddl().create_schema("s1").unwrap();
        engine
            .ddl()
            .create_entity(
                "s1",
                "e1",
                &[ColumnDef::new("id", DataType::Int8, false)],
            )
            .unwrap();
        engine
            .dml()
            .insert("s1", "e1", vec![Value::Int8(7)])
            .unwrap();
        engine.shutdown();
    }

    let engine = engine(dir.path());
    let details = engine.ddl().entity_details("s1", "e1").unwrap();
    assert_eq!(details.rows, 1);
    let result = rows(engine.dql().query(&QueryRequest::scan("s1", "e1")).unwrap());
    assert_eq!(result[0].values[0], Value::Int8(7));
}

#[test]
fn ping_answers_until_shutdown() {
    let dir = tempdir().unwrap();
    let engine = engine(dir.path());
    assert!(engine.dql().ping());
    engine.shutdown();
    assert!(!engine.dql().ping());
}
