//! Arithmetic between two blocks: `add`, `sub`, `mul`, `div`.
//!
//! Both inputs must share bounds. A scalar side is broadcast across every
//! series of the other side. Two column blocks are matched one-to-one on
//! their full tag sets (block tags plus series tags, metric name dropped);
//! output series follow the left input's order and unmatched series are
//! dropped. Division follows IEEE semantics.

use std::collections::{HashMap, HashSet};
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use tsq_core::block::{Block, BlockKind, Bounds, Metadata, ScalarBlock, SeriesMeta};
use tsq_core::config::TransformOptions;
use tsq_core::context::QueryContext;
use tsq_core::dedupe::dedupe_metadata;
use tsq_core::error::Error as CoreError;
use tsq_core::id::NodeId;
use tsq_core::tags::{TagOptions, Tags};

use crate::controller::Controller;
use crate::traits::{expect_arity, OpError, OpNode, Params};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
}

impl ArithOp {
    pub const ALL: [ArithOp; 4] = [ArithOp::Add, ArithOp::Sub, ArithOp::Mul, ArithOp::Div];

    pub fn name(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
        }
    }

    pub fn apply(self, l: f64, r: f64) -> f64 {
        match self {
            ArithOp::Add => l + r,
            ArithOp::Sub => l - r,
            ArithOp::Mul => l * r,
            ArithOp::Div => l / r,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BinaryParams {
    pub op: ArithOp,
}

impl BinaryParams {
    pub fn new(op: ArithOp) -> Self {
        Self { op }
    }

    pub fn from_config(op: ArithOp, config: &serde_json::Value) -> Result<Self, OpError> {
        match config {
            serde_json::Value::Null => Ok(Self::new(op)),
            serde_json::Value::Object(m) if m.is_empty() => Ok(Self::new(op)),
            other => Err(OpError::Params {
                op: op.name().into(),
                reason: format!("takes no parameters, got {other}"),
            }),
        }
    }
}

impl fmt::Display for BinaryParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.op.name())
    }
}

impl Params for BinaryParams {
    fn op_type(&self) -> &'static str {
        self.op.name()
    }

    fn arity(&self) -> usize {
        2
    }

    fn node(&self, controller: Controller, _options: &TransformOptions) -> Box<dyn OpNode> {
        Box::new(BinaryNode {
            params: *self,
            controller,
        })
    }
}

pub struct BinaryNode {
    params: BinaryParams,
    controller: Controller,
}

impl OpNode for BinaryNode {
    fn params(&self) -> &dyn Params {
        &self.params
    }

    fn process(
        &self,
        ctx: &QueryContext,
        _id: NodeId,
        inputs: &[Arc<dyn Block>],
    ) -> Result<(), OpError> {
        expect_arity(self.params.op.name(), 2, inputs)?;
        ctx.check()?;
        let out = self.process_blocks(ctx, inputs[0].as_ref(), inputs[1].as_ref())?;
        self.controller.process(ctx, out)
    }
}

impl BinaryNode {
    fn process_blocks(
        &self,
        ctx: &QueryContext,
        lhs: &dyn Block,
        rhs: &dyn Block,
    ) -> Result<Arc<dyn Block>, OpError> {
        let bounds = lhs.meta().bounds;
        if rhs.meta().bounds != bounds {
            return Err(OpError::BoundsMismatch(format!(
                "{}: left {:?}, right {:?}",
                self.params.op.name(),
                bounds,
                rhs.meta().bounds
            )));
        }

        let op = self.params.op;
        match (lhs.kind(), rhs.kind()) {
            (BlockKind::Scalar, BlockKind::Scalar) => {
                let l = scalar_values(lhs)?;
                let r = scalar_values(rhs)?;
                let values = l.iter().zip(&r).map(|(a, b)| op.apply(*a, *b)).collect();
                let opts = lhs.meta().tag_options().clone();
                Ok(Arc::new(scalar_from_values(values, bounds, opts)))
            }
            (BlockKind::Column, BlockKind::Scalar) => {
                let r = scalar_values(rhs)?;
                self.broadcast(ctx, lhs, &r, |v, s| op.apply(v, s))
            }
            (BlockKind::Scalar, BlockKind::Column) => {
                let l = scalar_values(lhs)?;
                self.broadcast(ctx, rhs, &l, |v, s| op.apply(s, v))
            }
            (BlockKind::Column, BlockKind::Column) => self.match_one_to_one(ctx, lhs, rhs),
        }
    }

    fn broadcast<F>(
        &self,
        ctx: &QueryContext,
        column: &dyn Block,
        scalar: &[f64],
        f: F,
    ) -> Result<Arc<dyn Block>, OpError>
    where
        F: Fn(f64, f64) -> f64,
    {
        let meta = column.meta();
        let series: Vec<SeriesMeta> = column
            .series_meta()
            .iter()
            .map(|s| SeriesMeta::new(s.tags.without_name(), Vec::<u8>::new()))
            .collect();
        let out_meta = Metadata::new(meta.bounds, meta.tags.without_name());

        let mut builder = self.controller.block_builder(ctx, out_meta, series)?;
        builder.add_cols(meta.bounds.steps())?;

        let mut it = column.step_iter()?;
        let mut row = Vec::with_capacity(column.series_meta().len());
        let mut index = 0;
        while it.advance() {
            let step = it.current().ok_or_else(missing_step)?;
            let s = scalar.get(index).copied().unwrap_or(f64::NAN);
            row.clear();
            row.extend(step.values().iter().map(|v| f(*v, s)));
            if !row.is_empty() {
                builder.append_values(index, &row)?;
            }
            index += 1;
        }
        if let Some(e) = it.err() {
            return Err(e.into());
        }
        Ok(Arc::new(builder.build()?))
    }

    fn match_one_to_one(
        &self,
        ctx: &QueryContext,
        lhs: &dyn Block,
        rhs: &dyn Block,
    ) -> Result<Arc<dyn Block>, OpError> {
        let op = self.params.op;
        let left = matching_tags(lhs);
        let right = matching_tags(rhs);

        let mut right_index = HashMap::with_capacity(right.len());
        for (j, tags) in right.iter().enumerate() {
            if right_index.insert(tags.id(), j).is_some() {
                return Err(OpError::Matching(format!(
                    "{}: duplicate series {} on the right-hand side",
                    op.name(),
                    tags
                )));
            }
        }

        let mut seen = HashSet::with_capacity(left.len());
        let mut pairs = Vec::new();
        let mut matched = Vec::new();
        for (i, tags) in left.into_iter().enumerate() {
            let id = tags.id();
            if !seen.insert(id) {
                return Err(OpError::Matching(format!(
                    "{}: duplicate series {} on the left-hand side",
                    op.name(),
                    tags
                )));
            }
            if let Some(&j) = right_index.get(&id) {
                pairs.push((i, j));
                matched.push(SeriesMeta::new(tags, Vec::<u8>::new()));
            }
        }

        let bounds = lhs.meta().bounds;
        let (common, residual) = dedupe_metadata(&matched, lhs.meta().tag_options());
        let mut builder =
            self.controller
                .block_builder(ctx, Metadata::new(bounds, common), residual)?;
        builder.add_cols(bounds.steps())?;

        let mut l = lhs.step_iter()?;
        let mut r = rhs.step_iter()?;
        let mut row = Vec::with_capacity(pairs.len());
        let mut index = 0;
        loop {
            let (more_l, more_r) = (l.advance(), r.advance());
            if !more_l || !more_r {
                if let Some(e) = l.err().or_else(|| r.err()) {
                    return Err(e.into());
                }
                if more_l != more_r {
                    return Err(CoreError::Invariant(format!(
                        "{}: inputs disagree on step count after {index} steps",
                        op.name()
                    ))
                    .into());
                }
                break;
            }
            let (ls, rs) = (
                l.current().ok_or_else(missing_step)?,
                r.current().ok_or_else(missing_step)?,
            );
            row.clear();
            row.extend(pairs.iter().map(|&(i, j)| {
                let a = ls.values().get(i).copied().unwrap_or(f64::NAN);
                let b = rs.values().get(j).copied().unwrap_or(f64::NAN);
                op.apply(a, b)
            }));
            if !row.is_empty() {
                builder.append_values(index, &row)?;
            }
            index += 1;
        }
        Ok(Arc::new(builder.build()?))
    }
}

/// Identity each series is matched on.
fn matching_tags(block: &dyn Block) -> Vec<Tags> {
    let block_tags = &block.meta().tags;
    block
        .series_meta()
        .iter()
        .map(|s| block_tags.add(&s.tags).without_name())
        .collect()
}

fn scalar_values(block: &dyn Block) -> Result<Vec<f64>, OpError> {
    let mut out = Vec::with_capacity(block.meta().bounds.steps());
    let mut it = block.step_iter()?;
    while it.advance() {
        let step = it.current().ok_or_else(missing_step)?;
        out.push(step.values().first().copied().unwrap_or(f64::NAN));
    }
    if let Some(e) = it.err() {
        return Err(e.into());
    }
    Ok(out)
}

fn scalar_from_values(values: Vec<f64>, bounds: Bounds, opts: TagOptions) -> ScalarBlock {
    let start = bounds.start_ms();
    let step = bounds.step_ms();
    ScalarBlock::new(
        move |t| {
            if t < start {
                return f64::NAN;
            }
            usize::try_from((t - start) / step)
                .ok()
                .and_then(|i| values.get(i).copied())
                .unwrap_or(f64::NAN)
        },
        bounds,
        opts,
    )
}

fn missing_step() -> CoreError {
    CoreError::Invariant("step iterator advanced without a current step".into())
}
