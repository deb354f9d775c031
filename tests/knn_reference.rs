//! # kNN Exactness Tests
//!
//! The parallel block-partitioned top-k must match a brute-force
//! reference bit for bit: same neighbors, same distances, same order,
//! ties broken toward the lower tuple-id. The dataset is generated from
//! a fixed seed so the reference ranking is stable.

use std::sync::Arc;

use ocelotdb::catalog::Entity;
use ocelotdb::exec::tasks::knn::{KnnTask, QueryVector};
use ocelotdb::exec::tasks::Task;
use ocelotdb::knn::Distance;
use ocelotdb::storage::StoreOptions;
use ocelotdb::types::{ColumnDef, DataType, Name, TupleId, Value};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tempfile::tempdir;
use uuid::Uuid;

const DIM: usize = 128;
const ROWS: usize = 500;
const SEED: u64 = 0x0CE107;

fn random_vector(rng: &mut StdRng) -> Vec<f32> {
    (0..DIM).map(|_| rng.gen_range(-1.0f32..1.0)).collect()
}

fn seeded_entity(dir: &std::path::Path) -> (Arc<Entity>, Vec<(TupleId, Vec<f32>)>) {
    let entity = Entity::create(
        dir,
        Name::parse("bench.embeddings").unwrap(),
        &[ColumnDef::vector(
            "embedding",
            DataType::Float4Vector,
            DIM,
            false,
        )],
        &StoreOptions::default(),
    )
    .unwrap();

    let mut rng = StdRng::seed_from_u64(SEED);
    let vectors: Vec<Vec<f32>> = (0..ROWS).map(|_| random_vector(&mut rng)).collect();

    let mut tx = entity.new_transaction(false, Uuid::new_v4()).unwrap();
    let mut dataset = Vec::with_capacity(ROWS);
    for vector in vectors {
        let tid = tx
            .insert(vec![Value::Float4Vector(vector.clone())])
            .unwrap();
        dataset.push((tid, vector));
    }
    tx.commit().unwrap();
    tx.close();
    (entity, dataset)
}

/// Brute-force reference: full ascending order under (distance, tid).
fn reference_ranking(
    dataset: &[(TupleId, Vec<f32>)],
    query: &[f32],
    metric: Distance,
) -> Vec<(TupleId, f64)> {
    let mut scored: Vec<(TupleId, f64)> = dataset
        .iter()
        .map(|(tid, v)| (*tid, metric.between_f32(v, query)))
        .collect();
    scored.sort_by(|a, b| a.1.total_cmp(&b.1).then_with(|| a.0.cmp(&b.0)));
    scored
}

fn run_knn(
    entity: &Arc<Entity>,
    query: &[f32],
    metric: Distance,
    k: usize,
    parallelism: usize,
) -> Vec<(TupleId, f64)> {
    let task = KnnTask::new(
        Arc::clone(entity),
        "embedding",
        QueryVector::Float4(query.to_vec()),
        metric,
        k,
        parallelism,
        None,
    )
    .unwrap();
    let out = task.execute(&[]).unwrap();
    out.iter()
        .map(|row| {
            let distance = match row.values[0] {
                Value::Float8(d) => d,
                _ => unreachable!("knn emits Float8 distances"),
            };
            (row.tuple_id, distance)
        })
        .collect()
}

#[test]
fn matches_brute_force_across_metrics() {
    let dir = tempdir().unwrap();
    let (entity, dataset) = seeded_entity(dir.path());

    let mut rng = StdRng::seed_from_u64(SEED ^ 0xFFFF);
    let query = random_vector(&mut rng);

    for metric in [
        Distance::L1,
        Distance::L2,
        Distance::L2Squared,
        Distance::Cosine,
    ] {
        let expected: Vec<(TupleId, f64)> = reference_ranking(&dataset, &query, metric)
            .into_iter()
            .take(10)
            .collect();
        let actual = run_knn(&entity, &query, metric, 10, 4);
        assert_eq!(actual, expected, "metric {:?}", metric);
    }
}

#[test]
fn parallelism_does_not_change_the_answer() {
    let dir = tempdir().unwrap();
    let (entity, dataset) = seeded_entity(dir.path());

    let mut rng = StdRng::seed_from_u64(SEED ^ 0xAB);
    let query = random_vector(&mut rng);
    let expected: Vec<(TupleId, f64)> = reference_ranking(&dataset, &query, Distance::L2)
        .into_iter()
        .take(25)
        .collect();

    for parallelism in [1, 2, 3, 8, 17] {
        let actual = run_knn(&entity, &query, Distance::L2, 25, parallelism);
        assert_eq!(actual, expected, "parallelism {}", parallelism);
    }
}

#[test]
fn k_of_dataset_size_returns_full_ordering() {
    let dir = tempdir().unwrap();
    let (entity, dataset) = seeded_entity(dir.path());

    let mut rng = StdRng::seed_from_u64(SEED ^ 0xC0FFEE);
    let query = random_vector(&mut rng);
    let expected = reference_ranking(&dataset, &query, Distance::L2Squared);
    let actual = run_knn(&entity, &query, Distance::L2Squared, ROWS, 4);
    assert_eq!(actual.len(), ROWS);
    assert_eq!(actual, expected);
}

#[test]
fn duplicate_vectors_tie_break_by_tuple_id() {
    let dir = tempdir().unwrap();
    let entity = Entity::create(
        dir.path(),
        Name::parse("bench.dupes").unwrap(),
        &[ColumnDef::vector(
            "embedding",
            DataType::Float4Vector,
            4,
            false,
        )],
        &StoreOptions::default(),
    )
    .unwrap();

    let mut tx = entity.new_transaction(false, Uuid::new_v4()).unwrap();
    let mut tids = Vec::new();
    for _ in 0..6 {
        tids.push(
            tx.insert(vec![Value::Float4Vector(vec![1.0, 1.0, 0.0, 0.0])])
                .unwrap(),
        );
    }
    tx.commit().unwrap();
    tx.close();

    let actual = run_knn(&entity, &[0.0, 0.0, 0.0, 0.0], Distance::L2, 3, 2);
    let ids: Vec<TupleId> = actual.iter().map(|(tid, _)| *tid).collect();
    assert_eq!(ids, tids[..3].to_vec());
}
