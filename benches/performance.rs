use std::sync::Arc;

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion};
use tsq::core::block::{Block, Bounds, ColumnBlock, Metadata, SeriesMeta};
use tsq::core::config::{EngineConfig, TransformOptions};
use tsq::core::id::NodeId;
use tsq::core::tags::{TagOptions, Tags};
use tsq::mem::MemoryBudgetImpl;
use tsq::operators::{AbsentParams, CollectingSink, Controller, MemoryStorage, Params};
use tsq::{Engine, PlanNode, QueryContext, QueryPlan};

const STEPS: usize = 720;

/// `series` hosts over 720 one-minute steps; every fourth value is NaN.
fn make_block(series: usize) -> Arc<dyn Block> {
    let opts = TagOptions::default();
    let bounds = Bounds::new(0, 60_000, STEPS).unwrap();
    let block_tags = Tags::try_from_pairs(opts.clone(), [("job", "api")]).unwrap();
    let metas = (0..series)
        .map(|i| {
            let host = format!("host-{i}");
            let tags = Tags::try_from_pairs(opts.clone(), [("host", host.as_str())]).unwrap();
            SeriesMeta::new(tags, "http_requests_total")
        })
        .collect();
    let rows = (0..series)
        .map(|i| {
            (0..STEPS)
                .map(|s| if (s + i) % 4 == 0 { f64::NAN } else { s as f64 })
                .collect()
        })
        .collect();
    Arc::new(ColumnBlock::from_series(Metadata::new(bounds, block_tags), metas, rows).unwrap())
}

fn bench_absent(c: &mut Criterion) {
    let budget = MemoryBudgetImpl::new(256 * 1024 * 1024);
    let options = TransformOptions::default();
    let mut group = c.benchmark_group("absent");
    for series in [10, 1_000] {
        let block = make_block(series);
        group.bench_with_input(BenchmarkId::from_parameter(series), &block, |b, block| {
            b.iter(|| {
                let sink = Arc::new(CollectingSink::new());
                let controller =
                    Controller::new(NodeId::new(1), "absent", budget.scoped(), sink.clone());
                let node = AbsentParams::new().node(controller, &options);
                node.process(&QueryContext::new(), NodeId::new(1), &[Arc::clone(block)])
                    .unwrap();
                sink.take()
            })
        });
    }
    group.finish();
}

fn bench_engine_plan(c: &mut Criterion) {
    let storage = MemoryStorage::new();
    storage.insert("errors", make_block(1_000));
    storage.insert("requests", make_block(1_000));
    let engine = Engine::new(EngineConfig::default())
        .unwrap()
        .with_storage(Arc::new(storage));
    let plan = QueryPlan::new(
        vec![
            PlanNode::new(1, "fetch").with_config(serde_json::json!({"key": "errors"})),
            PlanNode::new(2, "fetch").with_config(serde_json::json!({"key": "requests"})),
            PlanNode::new(3, "div").with_inputs(&[1, 2]),
            PlanNode::new(4, "absent").with_inputs(&[3]),
        ],
        4,
    );
    c.bench_function("engine_ratio_absent", |b| {
        b.iter(|| engine.execute(&QueryContext::new(), &plan).unwrap())
    });
}

criterion_group!(performance, bench_absent, bench_engine_plan);
criterion_main!(performance);
