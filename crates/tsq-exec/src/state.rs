//! Per-query state shared by both executors.
//!
//! `QueryState::prepare` resolves every scheduled plan node through the
//! registry, wires a `Controller` to it and allocates the node's output slot.
//! `run_node` then executes one node once its inputs are in their slots.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Instant;

use tsq_core::block::Block;
use tsq_core::config::TransformOptions;
use tsq_core::context::QueryContext;
use tsq_core::error::Error as CoreError;
use tsq_core::id::NodeId;
use tsq_core::plan::QueryPlan;
use tsq_mem::ScopedBudget;
use tsq_operators::controller::{BlockSink, Controller};
use tsq_operators::fetch::Storage;
use tsq_operators::registry::Registry;
use tsq_operators::traits::{OpError, OpNode};

use crate::metrics;
use crate::runtime::ExecError;

/// Output slot of one node.
///
/// `remaining` counts outstanding reads; when it reaches zero the block is
/// dropped so its budget reservation returns early. The query output holds
/// one extra read that `take_output` consumes.
struct Slot {
    block: Mutex<Option<Arc<dyn Block>>>,
    delivered: AtomicBool,
    remaining: AtomicUsize,
}

pub(crate) struct Slots {
    slots: HashMap<NodeId, Slot>,
}

impl Slots {
    fn slot(&self, node: NodeId) -> Result<&Slot, OpError> {
        self.slots
            .get(&node)
            .ok_or_else(|| OpError::Delivery(format!("node {node} has no output slot")))
    }

    pub(crate) fn get(&self, node: NodeId) -> Option<Arc<dyn Block>> {
        let slot = self.slots.get(&node)?;
        let guard = slot.block.lock().ok()?;
        guard.clone()
    }

    pub(crate) fn is_delivered(&self, node: NodeId) -> bool {
        self.slots
            .get(&node)
            .is_some_and(|s| s.delivered.load(Ordering::Acquire))
    }

    /// Record that one consumer of `node` is done with its block.
    pub(crate) fn release(&self, node: NodeId) {
        let Some(slot) = self.slots.get(&node) else {
            return;
        };
        let prev = slot.remaining.fetch_sub(1, Ordering::AcqRel);
        if prev == 1 {
            if let Ok(mut b) = slot.block.lock() {
                b.take();
            }
        }
    }

    fn take(&self, node: NodeId) -> Option<Arc<dyn Block>> {
        let slot = self.slots.get(&node)?;
        let mut guard = slot.block.lock().ok()?;
        guard.take()
    }
}

impl BlockSink for Slots {
    fn deliver(&self, node: NodeId, block: Arc<dyn Block>) -> Result<(), OpError> {
        let slot = self.slot(node)?;
        if slot.delivered.swap(true, Ordering::AcqRel) {
            return Err(OpError::Delivery(format!(
                "node {node} delivered more than one block"
            )));
        }
        let mut b = slot
            .block
            .lock()
            .map_err(|_| OpError::Delivery(format!("slot for node {node} poisoned")))?;
        *b = Some(block);
        Ok(())
    }
}

pub(crate) struct PreparedNode {
    pub(crate) id: NodeId,
    pub(crate) op: &'static str,
    pub(crate) inputs: Vec<NodeId>,
    node: Box<dyn OpNode>,
}

/// Everything one query execution owns.
pub(crate) struct QueryState {
    pub(crate) order: Vec<NodeId>,
    pub(crate) nodes: HashMap<NodeId, PreparedNode>,
    pub(crate) output: NodeId,
    pub(crate) scope: ScopedBudget,
    slots: Arc<Slots>,
}

impl QueryState {
    pub(crate) fn prepare(
        plan: &QueryPlan,
        registry: &Registry,
        storage: &Arc<dyn Storage>,
        scope: ScopedBudget,
        options: &TransformOptions,
    ) -> Result<Self, ExecError> {
        let order = plan
            .topological_order()
            .map_err(|e| ExecError::Plan(e.to_string()))?;
        let consumers = plan.consumers(&order);

        let slots: HashMap<NodeId, Slot> = order
            .iter()
            .map(|id| {
                let reads = consumers.get(id).copied().unwrap_or(0)
                    + usize::from(*id == plan.output);
                (
                    *id,
                    Slot {
                        block: Mutex::new(None),
                        delivered: AtomicBool::new(false),
                        remaining: AtomicUsize::new(reads),
                    },
                )
            })
            .collect();
        let slots = Arc::new(Slots { slots });

        let mut nodes = HashMap::with_capacity(order.len());
        for id in &order {
            let decl = plan
                .node(*id)
                .ok_or_else(|| ExecError::Plan(format!("node {id} vanished from plan")))?;
            let params = registry
                .make(&decl.op, &decl.config)
                .map_err(|source| ExecError::Registry { node: *id, source })?;
            if params.arity() != decl.inputs.len() {
                return Err(ExecError::Plan(format!(
                    "node {} ({}) takes {} input(s), plan wires {}",
                    id,
                    params.op_type(),
                    params.arity(),
                    decl.inputs.len()
                )));
            }

            let sink: Arc<dyn BlockSink> = slots.clone();
            let mut controller = Controller::new(*id, params.op_type(), scope.clone(), sink)
                .with_series_limit(options.max_series_per_block);
            if decl.is_leaf() {
                controller = controller.with_storage(Arc::clone(storage));
            }

            #[cfg(feature = "tracing")]
            tracing::debug!(node = %id, op = params.op_type(), params = %params, "instantiated node");

            nodes.insert(
                *id,
                PreparedNode {
                    id: *id,
                    op: params.op_type(),
                    inputs: decl.inputs.clone(),
                    node: params.node(controller, options),
                },
            );
        }

        Ok(Self {
            order,
            nodes,
            output: plan.output,
            scope,
            slots,
        })
    }

    pub(crate) fn node(&self, id: NodeId) -> Result<&PreparedNode, ExecError> {
        self.nodes
            .get(&id)
            .ok_or_else(|| ExecError::Plan(format!("node {id} was not prepared")))
    }

    /// Execute `id` against the blocks its inputs delivered.
    pub(crate) fn run_node(&self, ctx: &QueryContext, id: NodeId) -> Result<(), ExecError> {
        let n = self.node(id)?;
        ctx.check().map_err(ExecError::from_core)?;

        let mut inputs = Vec::with_capacity(n.inputs.len());
        for input in &n.inputs {
            let block = self.slots.get(*input).ok_or_else(|| ExecError::Node {
                node: id,
                op: n.op.to_string(),
                source: OpError::Delivery(format!("input {input} has no block")),
            })?;
            inputs.push(block);
        }

        let started = Instant::now();
        let res = n.node.process(ctx, id, &inputs);
        drop(inputs);
        for input in &n.inputs {
            self.slots.release(*input);
        }
        res.map_err(|e| ExecError::from_op(n, e))?;

        if !self.slots.is_delivered(id) {
            return Err(ExecError::Node {
                node: id,
                op: n.op.to_string(),
                source: OpError::Delivery("node returned without emitting a block".into()),
            });
        }
        metrics::record_node(id, n.op, started.elapsed(), self.scope.scope_used_bytes());
        Ok(())
    }

    pub(crate) fn take_output(&self) -> Result<Arc<dyn Block>, ExecError> {
        self.slots.take(self.output).ok_or_else(|| {
            ExecError::Plan(format!("output node {} produced no block", self.output))
        })
    }
}

impl ExecError {
    pub(crate) fn from_core(e: CoreError) -> Self {
        match e {
            CoreError::Canceled(_) => ExecError::Canceled,
            CoreError::DeadlineExceeded(_) => ExecError::DeadlineExceeded,
            other => ExecError::Plan(other.to_string()),
        }
    }

    pub(crate) fn from_op(n: &PreparedNode, e: OpError) -> Self {
        match e {
            OpError::Core(CoreError::Canceled(_)) => ExecError::Canceled,
            OpError::Core(CoreError::DeadlineExceeded(_)) => ExecError::DeadlineExceeded,
            source @ OpError::Storage(_) => ExecError::Storage {
                node: n.id,
                op: n.op.to_string(),
                source,
            },
            source => ExecError::Node {
                node: n.id,
                op: n.op.to_string(),
                source,
            },
        }
    }
}
