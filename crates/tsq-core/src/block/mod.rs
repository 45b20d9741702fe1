//! Blocks: immutable, time-bounded matrices of series values.
//!
//! A block is the unit of data flowing along DAG edges. Once built it is
//! shared read-only (`Arc<dyn Block>`) between every consumer.

pub mod bounds;
pub mod builder;
pub mod column;
pub mod iter;
pub mod meta;
pub mod scalar;

use std::fmt;

pub use bounds::Bounds;
pub use builder::BlockBuilder;
pub use column::ColumnBlock;
pub use iter::{Series, SeriesIter, Step, StepIter};
pub use meta::{Metadata, SeriesMeta};
pub use scalar::ScalarBlock;

use crate::error::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    /// N series x M steps backed by a value matrix.
    Column,
    /// Zero series; one value per step derived from time.
    Scalar,
}

pub trait Block: Send + Sync + fmt::Debug {
    fn kind(&self) -> BlockKind;
    fn meta(&self) -> &Metadata;
    fn series_meta(&self) -> &[SeriesMeta];

    /// Step-major cursor. Each call returns a fresh, independent pass.
    fn step_iter(&self) -> Result<Box<dyn StepIter + '_>>;

    /// Series-major cursor. Each call returns a fresh, independent pass.
    fn series_iter(&self) -> Result<Box<dyn SeriesIter + '_>>;
}

/// Walk both views of `block` and confirm they agree with its bounds and
/// series metadata. Iterator failures are returned as-is.
pub fn check_dimensions(block: &dyn Block) -> Result<()> {
    let steps = block.meta().bounds.steps();
    let series = block.series_meta().len();
    let width = match block.kind() {
        BlockKind::Column => series,
        BlockKind::Scalar => 1,
    };

    let mut it = block.step_iter()?;
    let mut seen_steps = 0;
    while it.advance() {
        let step = it
            .current()
            .ok_or_else(|| Error::Invariant("advance() true without a current step".into()))?;
        if step.values().len() != width {
            return Err(Error::Invariant(format!(
                "step {} has {} values, expected {}",
                seen_steps,
                step.values().len(),
                width
            )));
        }
        seen_steps += 1;
    }
    if let Some(e) = it.err() {
        return Err(e);
    }
    if seen_steps != steps {
        return Err(Error::Invariant(format!(
            "step iterator yielded {seen_steps} steps, bounds declare {steps}"
        )));
    }

    let mut it = block.series_iter()?;
    let mut seen_series = 0;
    while it.advance() {
        let s = it
            .current()
            .ok_or_else(|| Error::Invariant("advance() true without a current series".into()))?;
        if s.values().len() != steps {
            return Err(Error::Invariant(format!(
                "series {} has {} values, expected {}",
                seen_series,
                s.values().len(),
                steps
            )));
        }
        seen_series += 1;
    }
    if let Some(e) = it.err() {
        return Err(e);
    }
    if seen_series != series {
        return Err(Error::Invariant(format!(
            "series iterator yielded {seen_series} series, metadata lists {series}"
        )));
    }
    Ok(())
}
