//! Operator contract: parameters, executable nodes and the shared error type.
//!
//! A plan node is described by an immutable `Params` value. The engine turns
//! it into an `OpNode` once per query by handing it a `Controller`; the node
//! then receives its upstream blocks, in slot order, through `process`.
//!
//! Invariants:
//! - A node emits at most one block per query, through its controller.
//! - Output blocks are built through `Controller::block_builder` so the
//!   memory budget and series limit see every allocation.
//! - Nodes never mutate their inputs; blocks are shared between consumers.

use std::fmt;
use std::sync::Arc;

use thiserror::Error;

use tsq_core::block::Block;
use tsq_core::config::TransformOptions;
use tsq_core::context::QueryContext;
use tsq_core::error::Error as CoreError;
use tsq_core::id::NodeId;

use crate::controller::Controller;

#[derive(Debug, Error)]
pub enum OpError {
    #[error("invalid parameters for '{op}': {reason}")]
    Params { op: String, reason: String },

    #[error("'{op}' expects {expected} input(s), got {got}")]
    Arity {
        op: &'static str,
        expected: usize,
        got: usize,
    },

    #[error("unknown operator type '{0}'")]
    UnknownOp(String),

    #[error("bounds mismatch: {0}")]
    BoundsMismatch(String),

    #[error("cannot match series: {0}")]
    Matching(String),

    #[error("resource exhausted: {0}")]
    ResourceExhausted(String),

    #[error("storage: {0}")]
    Storage(String),

    #[error("delivery: {0}")]
    Delivery(String),

    #[error(transparent)]
    Core(#[from] CoreError),
}

impl OpError {
    /// True when the failure only reports that the query was abandoned.
    pub fn is_cancellation(&self) -> bool {
        matches!(self, OpError::Core(e) if e.is_cancellation())
    }
}

impl From<tsq_mem::Error> for OpError {
    fn from(e: tsq_mem::Error) -> Self {
        OpError::ResourceExhausted(e.to_string())
    }
}

/// Immutable description of one operator instance.
///
/// `Display` renders the parameters for logs and error reports.
pub trait Params: Send + Sync + fmt::Debug + fmt::Display {
    /// Stable operator type name, e.g. "absent".
    fn op_type(&self) -> &'static str;

    /// Number of upstream blocks the node consumes.
    fn arity(&self) -> usize;

    /// Instantiate an executable node bound to `controller`.
    fn node(&self, controller: Controller, options: &TransformOptions) -> Box<dyn OpNode>;
}

/// Executable, per-query instance of an operator.
pub trait OpNode: Send + Sync {
    fn params(&self) -> &dyn Params;

    /// Consume every upstream block (ordered by input slot) and emit the
    /// result through the node's controller.
    fn process(
        &self,
        ctx: &QueryContext,
        id: NodeId,
        inputs: &[Arc<dyn Block>],
    ) -> Result<(), OpError>;
}

/// Single-input node whose work is a pure block-to-block transformation.
pub trait SimpleOpNode: Send + Sync {
    fn params(&self) -> &dyn Params;

    fn controller(&self) -> &Controller;

    fn process_block(
        &self,
        ctx: &QueryContext,
        id: NodeId,
        block: &dyn Block,
    ) -> Result<Arc<dyn Block>, OpError>;
}

/// Drive a `SimpleOpNode`: check arity, transform the single input and hand
/// the result to the controller.
pub fn process_simple_block<N>(
    node: &N,
    ctx: &QueryContext,
    id: NodeId,
    inputs: &[Arc<dyn Block>],
) -> Result<(), OpError>
where
    N: SimpleOpNode + ?Sized,
{
    let block = match inputs {
        [block] => block,
        _ => {
            return Err(OpError::Arity {
                op: node.params().op_type(),
                expected: 1,
                got: inputs.len(),
            })
        }
    };
    ctx.check()?;
    let out = node.process_block(ctx, id, block.as_ref())?;
    node.controller().process(ctx, out)
}

/// Check `inputs` has exactly `expected` blocks.
pub(crate) fn expect_arity(
    op: &'static str,
    expected: usize,
    inputs: &[Arc<dyn Block>],
) -> Result<(), OpError> {
    if inputs.len() != expected {
        return Err(OpError::Arity {
            op,
            expected,
            got: inputs.len(),
        });
    }
    Ok(())
}
