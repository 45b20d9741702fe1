//! Pass-through operators used by the executor tests.

use std::fmt;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tsq_core::block::{Block, Bounds, ColumnBlock, Metadata, SeriesMeta};
use tsq_core::config::TransformOptions;
use tsq_core::context::QueryContext;
use tsq_core::id::NodeId;
use tsq_core::tags::{TagOptions, Tags};
use tsq_operators::controller::Controller;
use tsq_operators::fetch::MemoryStorage;
use tsq_operators::registry::Registry;
use tsq_operators::traits::{OpError, OpNode, Params};

/// Forwards its input after sleeping `delay`, counting every run.
#[derive(Debug, Clone)]
pub(crate) struct PassParams {
    pub(crate) delay: Duration,
    pub(crate) hits: Arc<AtomicUsize>,
}

impl fmt::Display for PassParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "pass(delay={:?})", self.delay)
    }
}

impl Params for PassParams {
    fn op_type(&self) -> &'static str {
        "pass"
    }

    fn arity(&self) -> usize {
        1
    }

    fn node(&self, controller: Controller, _: &TransformOptions) -> Box<dyn OpNode> {
        Box::new(PassNode {
            params: self.clone(),
            controller,
        })
    }
}

struct PassNode {
    params: PassParams,
    controller: Controller,
}

impl OpNode for PassNode {
    fn params(&self) -> &dyn Params {
        &self.params
    }

    fn process(
        &self,
        ctx: &QueryContext,
        _id: NodeId,
        inputs: &[Arc<dyn Block>],
    ) -> Result<(), OpError> {
        self.params.hits.fetch_add(1, Ordering::SeqCst);
        std::thread::sleep(self.params.delay);
        let block = inputs.first().ok_or(OpError::Arity {
            op: "pass",
            expected: 1,
            got: 0,
        })?;
        self.controller.process(ctx, Arc::clone(block))
    }
}

/// Registry with `pass` taking `{"delay_ms": n}`; every instance shares `hits`.
pub(crate) fn registry(hits: Arc<AtomicUsize>) -> Registry {
    let mut r = Registry::new();
    r.register("pass", move |cfg| {
        let ms = cfg.get("delay_ms").and_then(|v| v.as_u64()).unwrap_or(0);
        Ok(Arc::new(PassParams {
            delay: Duration::from_millis(ms),
            hits: Arc::clone(&hits),
        }) as Arc<dyn Params>)
    });
    r
}

pub(crate) fn tags(pairs: &[(&str, &str)]) -> Tags {
    Tags::try_from_pairs(TagOptions::default(), pairs.iter().copied()).unwrap()
}

/// `up`: two api hosts over 3 steps; `down`: the same hosts, other values;
/// `short`: one series over 2 steps.
pub(crate) fn storage() -> MemoryStorage {
    let store = MemoryStorage::new();
    let bounds = Bounds::new(0, 1_000, 3).unwrap();
    let hosts = || {
        vec![
            SeriesMeta::new(tags(&[("host", "a")]), "up"),
            SeriesMeta::new(tags(&[("host", "b")]), "up"),
        ]
    };
    let up = ColumnBlock::from_series(
        Metadata::new(bounds, tags(&[("job", "api")])),
        hosts(),
        vec![vec![f64::NAN, 1.0, f64::NAN], vec![f64::NAN, f64::NAN, f64::NAN]],
    )
    .unwrap();
    let down = ColumnBlock::from_series(
        Metadata::new(bounds, tags(&[("job", "api")])),
        hosts(),
        vec![vec![10.0, 20.0, 30.0], vec![1.0, 2.0, 3.0]],
    )
    .unwrap();
    let short = ColumnBlock::from_series(
        Metadata::new(Bounds::new(0, 1_000, 2).unwrap(), tags(&[("job", "api")])),
        vec![SeriesMeta::new(tags(&[("host", "a")]), "up")],
        vec![vec![1.0, 2.0]],
    )
    .unwrap();
    store.insert("up", Arc::new(up));
    store.insert("down", Arc::new(down));
    store.insert("short", Arc::new(short));
    store
}

pub(crate) fn series_rows(block: &dyn Block) -> Vec<Vec<f64>> {
    let mut out = vec![];
    let mut it = block.series_iter().unwrap();
    while it.advance() {
        out.push(it.current().unwrap().values().to_vec());
    }
    assert!(it.err().is_none());
    out
}
