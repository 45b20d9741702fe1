//! Runtime: execute a `QueryPlan` and return the output block with stats.
//!
//! Behavior:
//! - Instantiates nodes via `tsq-operators::registry`; leaves ("fetch") are
//!   wired to the engine's storage.
//! - `execute` walks the plan's topological order on the caller's thread.
//! - Every block built during the query is charged to a per-query scope of
//!   the engine's `MemoryBudgetImpl`; intermediate blocks are dropped as soon
//!   as their last consumer ran.
//! - The first failing node aborts the query; no partial result is returned.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use thiserror::Error;

use tsq_core::block::Block;
use tsq_core::config::{EngineConfig, TransformOptions};
use tsq_core::context::QueryContext;
use tsq_core::hash::Hash256;
use tsq_core::id::{NodeId, QueryId};
use tsq_core::plan::QueryPlan;
use tsq_mem::MemoryBudgetImpl;
use tsq_operators::fetch::{MemoryStorage, Storage};
use tsq_operators::registry::Registry;
use tsq_operators::traits::OpError;

use crate::metrics;
use crate::state::QueryState;

#[derive(Debug, Error)]
pub enum ExecError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("invalid plan: {0}")]
    Plan(String),

    #[error("operator registry: node {node}: {source}")]
    Registry {
        node: NodeId,
        #[source]
        source: OpError,
    },

    #[error("node {node} ({op}) failed: {source}")]
    Node {
        node: NodeId,
        op: String,
        #[source]
        source: OpError,
    },

    #[error("storage: node {node} ({op}): {source}")]
    Storage {
        node: NodeId,
        op: String,
        #[source]
        source: OpError,
    },

    #[error("query canceled")]
    Canceled,

    #[error("query deadline exceeded")]
    DeadlineExceeded,

    #[error("scheduler: {0}")]
    Scheduler(String),
}

impl ExecError {
    /// Node the failure originated from, if any.
    pub fn node(&self) -> Option<NodeId> {
        match self {
            ExecError::Registry { node, .. }
            | ExecError::Node { node, .. }
            | ExecError::Storage { node, .. } => Some(*node),
            _ => None,
        }
    }

    pub fn is_cancellation(&self) -> bool {
        matches!(self, ExecError::Canceled | ExecError::DeadlineExceeded)
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct QueryStats {
    pub plan_fingerprint: Hash256,
    pub nodes_executed: usize,
    pub series_out: usize,
    /// Highest number of block bytes the query held at once.
    pub peak_budget_bytes: usize,
    pub elapsed: Duration,
}

#[derive(Debug)]
pub struct QueryResult {
    pub query_id: QueryId,
    pub block: Arc<dyn Block>,
    pub stats: QueryStats,
}

/// Engine owns the memory budget, operator registry and storage.
pub struct Engine {
    cfg: EngineConfig,
    options: TransformOptions,
    budget: MemoryBudgetImpl,
    registry: Registry,
    storage: Arc<dyn Storage>,
}

impl Engine {
    pub fn new(cfg: EngineConfig) -> Result<Self, ExecError> {
        cfg.validate().map_err(|e| ExecError::Config(e.to_string()))?;
        let options = cfg
            .transform_options()
            .map_err(|e| ExecError::Config(e.to_string()))?;
        Ok(Self {
            budget: MemoryBudgetImpl::new(cfg.mem_cap_bytes),
            options,
            cfg,
            registry: Registry::new(),
            storage: Arc::new(MemoryStorage::new()),
        })
    }

    pub fn with_storage(mut self, storage: Arc<dyn Storage>) -> Self {
        self.storage = storage;
        self
    }

    pub fn with_registry(mut self, registry: Registry) -> Self {
        self.registry = registry;
        self
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    pub fn config(&self) -> &EngineConfig {
        &self.cfg
    }

    pub fn options(&self) -> &TransformOptions {
        &self.options
    }

    /// Engine-wide budget; every query draws from it.
    pub fn budget(&self) -> &MemoryBudgetImpl {
        &self.budget
    }

    /// Apply the configured default timeout when the caller set no deadline.
    pub(crate) fn effective_context(&self, ctx: &QueryContext) -> QueryContext {
        match (ctx.deadline(), self.cfg.query_timeout_ms) {
            (None, Some(ms)) => ctx.clone().with_timeout(Duration::from_millis(ms)),
            _ => ctx.clone(),
        }
    }

    pub(crate) fn prepare(&self, plan: &QueryPlan) -> Result<QueryState, ExecError> {
        QueryState::prepare(
            plan,
            &self.registry,
            &self.storage,
            self.budget.scoped(),
            &self.options,
        )
    }

    /// Run `plan` sequentially in topological order.
    pub fn execute(&self, ctx: &QueryContext, plan: &QueryPlan) -> Result<QueryResult, ExecError> {
        let ctx = self.effective_context(ctx);
        let started = Instant::now();
        let fingerprint = plan
            .fingerprint()
            .map_err(|e| ExecError::Plan(e.to_string()))?;
        let state = self.prepare(plan)?;

        #[cfg(feature = "tracing")]
        tracing::debug!(query = %ctx.id(), plan = %fingerprint.short(), nodes = state.order.len(), "executing plan");

        let mut executed = 0;
        for id in &state.order {
            ctx.check().map_err(ExecError::from_core)?;
            if let Err(e) = state.run_node(&ctx, *id) {
                #[cfg(feature = "tracing")]
                tracing::warn!(query = %ctx.id(), node = %id, error = %e, "query aborted");
                return Err(e);
            }
            executed += 1;
        }

        finish(&ctx, &state, fingerprint, executed, started)
    }
}

/// Collect the output block and stats once every node has run.
pub(crate) fn finish(
    ctx: &QueryContext,
    state: &QueryState,
    plan_fingerprint: Hash256,
    nodes_executed: usize,
    started: Instant,
) -> Result<QueryResult, ExecError> {
    let block = state.take_output()?;
    let stats = QueryStats {
        plan_fingerprint,
        nodes_executed,
        series_out: block.series_meta().len(),
        peak_budget_bytes: state.scope.peak_bytes(),
        elapsed: started.elapsed(),
    };
    metrics::record_query(ctx.id(), &stats);
    Ok(QueryResult {
        query_id: ctx.id(),
        block,
        stats,
    })
}
