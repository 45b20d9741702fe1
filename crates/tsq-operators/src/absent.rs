//! `absent`: 1 where the input has no data, 0 where it has some.
//!
//! With no input series the result is the constant scalar 1. Otherwise a
//! single series is emitted whose tags are the input's block tags merged with
//! the tags every input series shares; each step is 0 if any series holds a
//! non-NaN value there and 1 otherwise.

use std::fmt;
use std::sync::Arc;

use tsq_core::block::{Block, Metadata, ScalarBlock, SeriesMeta};
use tsq_core::config::TransformOptions;
use tsq_core::context::QueryContext;
use tsq_core::dedupe::dedupe_metadata;
use tsq_core::error::Error as CoreError;
use tsq_core::id::NodeId;
use tsq_core::tags::Tags;

use crate::controller::Controller;
use crate::traits::{process_simple_block, OpError, OpNode, Params, SimpleOpNode};

pub const ABSENT_TYPE: &str = "absent";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AbsentParams;

impl AbsentParams {
    pub fn new() -> Self {
        Self
    }

    /// `absent` takes no parameters; only a null or empty object is accepted.
    pub fn from_config(config: &serde_json::Value) -> Result<Self, OpError> {
        match config {
            serde_json::Value::Null => Ok(Self),
            serde_json::Value::Object(m) if m.is_empty() => Ok(Self),
            other => Err(OpError::Params {
                op: ABSENT_TYPE.into(),
                reason: format!("takes no parameters, got {other}"),
            }),
        }
    }
}

impl fmt::Display for AbsentParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(ABSENT_TYPE)
    }
}

impl Params for AbsentParams {
    fn op_type(&self) -> &'static str {
        ABSENT_TYPE
    }

    fn arity(&self) -> usize {
        1
    }

    fn node(&self, controller: Controller, _options: &TransformOptions) -> Box<dyn OpNode> {
        Box::new(AbsentNode {
            params: *self,
            controller,
        })
    }
}

pub struct AbsentNode {
    params: AbsentParams,
    controller: Controller,
}

impl OpNode for AbsentNode {
    fn params(&self) -> &dyn Params {
        &self.params
    }

    fn process(
        &self,
        ctx: &QueryContext,
        id: NodeId,
        inputs: &[Arc<dyn Block>],
    ) -> Result<(), OpError> {
        process_simple_block(self, ctx, id, inputs)
    }
}

impl SimpleOpNode for AbsentNode {
    fn params(&self) -> &dyn Params {
        &self.params
    }

    fn controller(&self) -> &Controller {
        &self.controller
    }

    fn process_block(
        &self,
        ctx: &QueryContext,
        _id: NodeId,
        block: &dyn Block,
    ) -> Result<Arc<dyn Block>, OpError> {
        let meta = block.meta();
        let opts = meta.tag_options().clone();
        let series = block.series_meta();

        if series.is_empty() {
            return Ok(Arc::new(ScalarBlock::constant(1.0, meta.bounds, opts)));
        }

        let (common, _) = dedupe_metadata(series, &opts);
        let out_meta = Metadata::new(meta.bounds, Tags::new(opts));
        let out_series = vec![SeriesMeta::new(meta.tags.add(&common), Vec::<u8>::new())];

        let mut builder = self.controller.block_builder(ctx, out_meta, out_series)?;
        builder.add_cols(meta.bounds.steps())?;

        let mut it = block.step_iter()?;
        let mut index = 0;
        while it.advance() {
            let step = it.current().ok_or_else(|| {
                CoreError::Invariant("step iterator advanced without a current step".into())
            })?;
            let present = step.values().iter().any(|v| !v.is_nan());
            builder.append_value(index, if present { 0.0 } else { 1.0 })?;
            index += 1;
        }
        if let Some(e) = it.err() {
            return Err(e.into());
        }

        Ok(Arc::new(builder.build()?))
    }
}
