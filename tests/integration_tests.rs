//! End-to-end integration tests: JSON plans through the engine.

use std::sync::Arc;

use tsq::core::block::{check_dimensions, Block, BlockKind, Bounds, ColumnBlock, Metadata, SeriesMeta};
use tsq::core::config::EngineConfig;
use tsq::core::tags::{TagOptions, Tags};
use tsq::operators::{MemoryStorage, OpError};
use tsq::{Engine, ExecError, QueryContext, QueryPlan};

const NAN: f64 = f64::NAN;

fn tags(pairs: &[(&str, &str)]) -> Tags {
    Tags::try_from_pairs(TagOptions::default(), pairs.iter().copied()).expect("valid tags")
}

fn bounds() -> Bounds {
    Bounds::new(1_700_000_000_000, 60_000, 3).expect("valid bounds")
}

fn column(block_tags: Tags, series: Vec<(Tags, Vec<f64>)>) -> Arc<dyn Block> {
    let (metas, rows): (Vec<_>, Vec<_>) = series
        .into_iter()
        .map(|(t, v)| (SeriesMeta::new(t, "http_requests"), v))
        .unzip();
    Arc::new(
        ColumnBlock::from_series(Metadata::new(bounds(), block_tags), metas, rows)
            .expect("consistent block"),
    )
}

fn setup_storage() -> MemoryStorage {
    let store = MemoryStorage::new();
    store.insert("empty", column(Tags::new(TagOptions::default()), vec![]));
    store.insert(
        "all_nan",
        column(
            tags(&[("dc", "east")]),
            vec![
                (tags(&[("host", "a"), ("job", "api")]), vec![NAN, NAN, NAN]),
                (tags(&[("host", "b"), ("job", "api")]), vec![NAN, NAN, NAN]),
            ],
        ),
    );
    store.insert(
        "mixed",
        column(
            Tags::new(TagOptions::default()),
            vec![
                (tags(&[("host", "a")]), vec![NAN, 1.0, NAN]),
                (tags(&[("host", "b")]), vec![NAN, NAN, NAN]),
            ],
        ),
    );
    store.insert(
        "errors",
        column(
            tags(&[("job", "api")]),
            vec![
                (tags(&[("host", "a")]), vec![1.0, 2.0, 3.0]),
                (tags(&[("host", "b")]), vec![0.0, 0.0, 5.0]),
            ],
        ),
    );
    store.insert(
        "requests",
        column(
            tags(&[("job", "api")]),
            vec![
                (tags(&[("host", "b")]), vec![10.0, 0.0, 10.0]),
                (tags(&[("host", "a")]), vec![10.0, 20.0, 30.0]),
            ],
        ),
    );
    store
}

fn engine() -> Engine {
    Engine::new(EngineConfig::default())
        .expect("default config is valid")
        .with_storage(Arc::new(setup_storage()))
}

fn absent_plan(key: &str) -> QueryPlan {
    QueryPlan::from_json(&format!(
        r#"{{
            "nodes": [
                {{"id": 1, "op": "fetch", "config": {{"key": "{key}"}}}},
                {{"id": 2, "op": "absent", "inputs": [1]}}
            ],
            "output": 2
        }}"#
    ))
    .expect("valid plan json")
}

fn steps(block: &dyn Block) -> Vec<Vec<f64>> {
    let mut out = vec![];
    let mut it = block.step_iter().expect("step iterator");
    while it.advance() {
        out.push(it.current().expect("current step").values().to_vec());
    }
    assert!(it.err().is_none());
    out
}

#[test]
fn test_absent_of_nothing_is_scalar_one() {
    let res = engine()
        .execute(&QueryContext::new(), &absent_plan("empty"))
        .expect("query succeeds");
    assert_eq!(res.block.kind(), BlockKind::Scalar);
    assert_eq!(res.block.meta().bounds, bounds());
    assert_eq!(steps(res.block.as_ref()), vec![vec![1.0]; 3]);
    assert_eq!(res.stats.series_out, 0);
    check_dimensions(res.block.as_ref()).expect("dimensions");
}

#[test]
fn test_absent_all_nan_keeps_common_tags() {
    let res = engine()
        .execute(&QueryContext::new(), &absent_plan("all_nan"))
        .expect("query succeeds");
    let block = res.block.as_ref();
    check_dimensions(block).expect("dimensions");
    assert!(block.meta().tags.is_empty());
    assert_eq!(block.series_meta().len(), 1);
    assert_eq!(block.series_meta()[0].tags, tags(&[("dc", "east"), ("job", "api")]));
    assert!(block.series_meta()[0].name.is_empty());
    assert_eq!(steps(block), vec![vec![1.0], vec![1.0], vec![1.0]]);
}

#[test]
fn test_absent_mixed_steps() {
    let res = engine()
        .execute(&QueryContext::new(), &absent_plan("mixed"))
        .expect("query succeeds");
    assert_eq!(steps(res.block.as_ref()), vec![vec![1.0], vec![0.0], vec![1.0]]);
}

#[test]
fn test_error_ratio_plan() {
    // errors / requests, matched by host regardless of storage order.
    let plan = QueryPlan::from_json(
        r#"{
            "nodes": [
                {"id": 1, "op": "fetch", "config": {"key": "errors"}},
                {"id": 2, "op": "fetch", "config": {"key": "requests"}},
                {"id": 3, "op": "div", "inputs": [1, 2]}
            ],
            "output": 3
        }"#,
    )
    .expect("valid plan json");
    let res = engine()
        .execute(&QueryContext::new(), &plan)
        .expect("query succeeds");
    let block = res.block.as_ref();
    check_dimensions(block).expect("dimensions");
    assert_eq!(block.meta().tags, tags(&[("job", "api")]));
    assert_eq!(block.series_meta()[0].tags, tags(&[("host", "a")]));
    assert_eq!(block.series_meta()[1].tags, tags(&[("host", "b")]));

    let rows = steps(block);
    assert_eq!(rows[0], vec![0.1, 0.0]);
    assert_eq!(rows[1][0], 0.1);
    assert!(rows[1][1].is_nan());
    assert_eq!(rows[2], vec![0.1, 0.5]);
}

#[test]
fn test_failure_names_node_and_operator() {
    let plan = QueryPlan::from_json(
        r#"{
            "nodes": [
                {"id": 10, "op": "fetch", "config": {"key": "errors"}},
                {"id": 11, "op": "absent", "inputs": [10]},
                {"id": 12, "op": "add", "inputs": [11, 11]}
            ],
            "output": 12
        }"#,
    )
    .expect("valid plan json");

    // One absent series over 3 steps needs 24 bytes.
    let tiny = Engine::new(EngineConfig {
        mem_cap_bytes: 16,
        ..EngineConfig::default()
    })
    .expect("valid config")
    .with_storage(Arc::new(setup_storage()));
    match tiny.execute(&QueryContext::new(), &plan) {
        Err(ExecError::Node { node, op, source }) => {
            assert_eq!(node.get(), 11);
            assert_eq!(op, "absent");
            assert!(matches!(source, OpError::ResourceExhausted(_)));
        }
        other => panic!("expected node failure, got {other:?}"),
    }
    assert_eq!(tiny.budget().used_bytes(), 0);
}

#[test]
fn test_series_limit_is_enforced() {
    let engine = Engine::new(EngineConfig {
        max_series_per_block: 1,
        ..EngineConfig::default()
    })
    .expect("valid config")
    .with_storage(Arc::new(setup_storage()));
    let plan = QueryPlan::from_json(
        r#"{
            "nodes": [
                {"id": 1, "op": "fetch", "config": {"key": "errors"}},
                {"id": 2, "op": "fetch", "config": {"key": "requests"}},
                {"id": 3, "op": "mul", "inputs": [1, 2]}
            ],
            "output": 3
        }"#,
    )
    .expect("valid plan json");
    let err = engine
        .execute(&QueryContext::new(), &plan)
        .expect_err("two series exceed the limit");
    assert_eq!(err.node().map(|n| n.get()), Some(3));
}

#[test]
fn test_malformed_plans_are_rejected() {
    assert!(QueryPlan::from_json(r#"{"nodes": []}"#).is_err());

    let cyclic = QueryPlan::from_json(
        r#"{
            "nodes": [
                {"id": 1, "op": "absent", "inputs": [2]},
                {"id": 2, "op": "absent", "inputs": [1]}
            ],
            "output": 2
        }"#,
    )
    .expect("valid json");
    assert!(matches!(
        engine().execute(&QueryContext::new(), &cyclic),
        Err(ExecError::Plan(_))
    ));
}

#[test]
fn test_results_release_the_budget() {
    let engine = engine();
    let res = engine
        .execute(&QueryContext::new(), &absent_plan("mixed"))
        .expect("query succeeds");
    assert_eq!(engine.budget().used_bytes(), 3 * 8);
    assert_eq!(res.stats.peak_budget_bytes, 3 * 8);
    drop(res);
    assert_eq!(engine.budget().used_bytes(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn test_parallel_matches_sequential() {
    let plan = QueryPlan::from_json(
        r#"{
            "nodes": [
                {"id": 1, "op": "fetch", "config": {"key": "errors"}},
                {"id": 2, "op": "fetch", "config": {"key": "requests"}},
                {"id": 3, "op": "div", "inputs": [1, 2]},
                {"id": 4, "op": "absent", "inputs": [3]},
                {"id": 5, "op": "absent", "inputs": [1]},
                {"id": 6, "op": "add", "inputs": [4, 5]}
            ],
            "output": 6
        }"#,
    )
    .expect("valid plan json");
    let engine = engine();

    let seq = engine
        .execute(&QueryContext::new(), &plan)
        .expect("sequential run");
    let par = engine
        .execute_parallel(&QueryContext::new(), &plan)
        .await
        .expect("parallel run");

    assert_eq!(seq.stats.plan_fingerprint, par.stats.plan_fingerprint);
    assert_eq!(seq.stats.nodes_executed, 6);
    assert_eq!(par.stats.nodes_executed, 6);
    assert_eq!(seq.block.series_meta(), par.block.series_meta());
    assert_eq!(steps(seq.block.as_ref()), steps(par.block.as_ref()));
    assert_eq!(steps(par.block.as_ref()), vec![vec![0.0], vec![0.0], vec![0.0]]);
}
