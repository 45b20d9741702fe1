//! Per-node handle between an operator and the engine.
//!
//! The controller owns everything a node may touch outside its own inputs:
//! the query's memory scope (builders), the sink its single output goes to,
//! and, for leaf nodes, the storage it fetches from.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use tsq_core::block::{Block, BlockBuilder, Metadata, SeriesMeta};
use tsq_core::context::QueryContext;
use tsq_core::id::NodeId;
use tsq_mem::ScopedBudget;

use crate::fetch::Storage;
use crate::traits::OpError;

/// Receives the block a node emits. Implemented by the engine.
pub trait BlockSink: Send + Sync {
    fn deliver(&self, node: NodeId, block: Arc<dyn Block>) -> Result<(), OpError>;
}

pub struct Controller {
    id: NodeId,
    op_type: &'static str,
    budget: ScopedBudget,
    sink: Arc<dyn BlockSink>,
    storage: Option<Arc<dyn Storage>>,
    max_series: Option<usize>,
    delivered: AtomicBool,
}

impl fmt::Debug for Controller {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Controller")
            .field("id", &self.id)
            .field("op_type", &self.op_type)
            .field("max_series", &self.max_series)
            .field("delivered", &self.has_delivered())
            .finish()
    }
}

impl Controller {
    pub fn new(
        id: NodeId,
        op_type: &'static str,
        budget: ScopedBudget,
        sink: Arc<dyn BlockSink>,
    ) -> Self {
        Self {
            id,
            op_type,
            budget,
            sink,
            storage: None,
            max_series: None,
            delivered: AtomicBool::new(false),
        }
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = Some(storage);
        self
    }

    pub fn with_series_limit(mut self, limit: Option<usize>) -> Self {
        self.max_series = limit;
        self
    }

    pub fn id(&self) -> NodeId {
        self.id
    }

    pub fn op_type(&self) -> &'static str {
        self.op_type
    }

    pub fn storage(&self) -> Result<&Arc<dyn Storage>, OpError> {
        self.storage
            .as_ref()
            .ok_or_else(|| OpError::Storage(format!("node {} has no storage attached", self.id)))
    }

    pub fn has_delivered(&self) -> bool {
        self.delivered.load(Ordering::Acquire)
    }

    /// Builder for this node's output block.
    ///
    /// Reserves `steps x series` values from the query's budget up front; the
    /// reservation travels into the built block and is released when the
    /// last reference to it is dropped.
    pub fn block_builder(
        &self,
        ctx: &QueryContext,
        meta: Metadata,
        series_meta: Vec<SeriesMeta>,
    ) -> Result<BlockBuilder, OpError> {
        ctx.check()?;
        if let Some(limit) = self.max_series {
            if series_meta.len() > limit {
                return Err(OpError::ResourceExhausted(format!(
                    "node {} ({}) would build {} series, limit is {}",
                    self.id,
                    self.op_type,
                    series_meta.len(),
                    limit
                )));
            }
        }
        let bytes = BlockBuilder::estimate_bytes(meta.bounds.steps(), series_meta.len());
        let guard = self.budget.acquire(bytes, self.op_type)?;
        Ok(BlockBuilder::new(meta, series_meta).with_guard(Box::new(guard)))
    }

    /// Emit this node's output. Only the first call is accepted.
    pub fn process(&self, ctx: &QueryContext, block: Arc<dyn Block>) -> Result<(), OpError> {
        ctx.check()?;
        if self.delivered.swap(true, Ordering::AcqRel) {
            return Err(OpError::Delivery(format!(
                "node {} ({}) already emitted its block",
                self.id, self.op_type
            )));
        }
        self.sink.deliver(self.id, block)
    }
}

/// Sink that keeps every delivered block in arrival order.
#[derive(Default)]
pub struct CollectingSink {
    blocks: Mutex<Vec<(NodeId, Arc<dyn Block>)>>,
}

impl CollectingSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn take(&self) -> Vec<(NodeId, Arc<dyn Block>)> {
        match self.blocks.lock() {
            Ok(mut g) => std::mem::take(&mut *g),
            Err(poisoned) => std::mem::take(&mut *poisoned.into_inner()),
        }
    }
}

impl BlockSink for CollectingSink {
    fn deliver(&self, node: NodeId, block: Arc<dyn Block>) -> Result<(), OpError> {
        self.blocks
            .lock()
            .map_err(|_| OpError::Delivery("collecting sink poisoned".into()))?
            .push((node, block));
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tsq_core::block::{Bounds, ScalarBlock};
    use tsq_core::tags::{TagOptions, Tags};
    use tsq_mem::MemoryBudgetImpl;

    fn meta(steps: usize) -> Metadata {
        Metadata::new(
            Bounds::new(0, 1_000, steps).unwrap(),
            Tags::new(TagOptions::default()),
        )
    }

    fn series(n: usize) -> Vec<SeriesMeta> {
        (0..n)
            .map(|i| SeriesMeta::new(Tags::new(TagOptions::default()), format!("s{i}")))
            .collect()
    }

    #[test]
    fn builder_reserves_and_block_releases() {
        let budget = MemoryBudgetImpl::new(1 << 20);
        let scope = budget.scoped();
        let sink = Arc::new(CollectingSink::new());
        let c = Controller::new(NodeId::new(3), "absent", scope.clone(), sink.clone());
        let ctx = QueryContext::new();

        let mut b = c.block_builder(&ctx, meta(4), series(2)).unwrap();
        assert_eq!(scope.scope_used_bytes(), 4 * 2 * 8);
        b.add_cols(4).unwrap();
        c.process(&ctx, Arc::new(b.build().unwrap())).unwrap();

        let mut got = sink.take();
        assert_eq!(got.len(), 1);
        assert_eq!(got[0].0, NodeId::new(3));
        assert_eq!(budget.used_bytes(), 64);
        got.clear();
        assert_eq!(budget.used_bytes(), 0);
        assert_eq!(scope.peak_bytes(), 64);
    }

    #[test]
    fn second_delivery_is_rejected() {
        let sink = Arc::new(CollectingSink::new());
        let c = Controller::new(
            NodeId::new(1),
            "absent",
            MemoryBudgetImpl::new(1024).scoped(),
            sink.clone(),
        );
        let ctx = QueryContext::new();
        let block = || -> Arc<dyn Block> {
            Arc::new(ScalarBlock::constant(
                1.0,
                Bounds::new(0, 1, 1).unwrap(),
                TagOptions::default(),
            ))
        };
        c.process(&ctx, block()).unwrap();
        assert!(c.has_delivered());
        assert!(matches!(c.process(&ctx, block()), Err(OpError::Delivery(_))));
        assert_eq!(sink.take().len(), 1);
    }

    #[test]
    fn series_limit_and_budget_are_enforced() {
        let ctx = QueryContext::new();
        let sink = Arc::new(CollectingSink::new());
        let limited = Controller::new(
            NodeId::new(1),
            "add",
            MemoryBudgetImpl::new(1 << 20).scoped(),
            sink.clone(),
        )
        .with_series_limit(Some(2));
        assert!(matches!(
            limited.block_builder(&ctx, meta(1), series(3)),
            Err(OpError::ResourceExhausted(_))
        ));

        let small = Controller::new(NodeId::new(2), "add", MemoryBudgetImpl::new(16).scoped(), sink);
        assert!(matches!(
            small.block_builder(&ctx, meta(10), series(1)),
            Err(OpError::ResourceExhausted(_))
        ));
    }

    #[test]
    fn canceled_query_gets_no_builder() {
        let ctx = QueryContext::new();
        ctx.cancel();
        let c = Controller::new(
            NodeId::new(1),
            "absent",
            MemoryBudgetImpl::new(1024).scoped(),
            Arc::new(CollectingSink::new()),
        );
        let err = c.block_builder(&ctx, meta(1), series(1)).unwrap_err();
        assert!(err.is_cancellation());
    }
}
