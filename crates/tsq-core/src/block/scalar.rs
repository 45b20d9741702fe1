//! Degenerate block with no series dimension.
//!
//! A scalar block carries one notional value per step, computed from the step
//! timestamp. Its step iterator yields a one-element slice holding that value;
//! its series iterator yields nothing.

use std::fmt;
use std::sync::Arc;

use crate::block::bounds::Bounds;
use crate::block::iter::{Series, SeriesIter, Step, StepIter};
use crate::block::meta::{Metadata, SeriesMeta};
use crate::block::{Block, BlockKind};
use crate::error::{Error, Result};
use crate::tags::{TagOptions, Tags};

pub type ScalarFn = Arc<dyn Fn(i64) -> f64 + Send + Sync>;

pub struct ScalarBlock {
    meta: Metadata,
    value: ScalarFn,
}

impl fmt::Debug for ScalarBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ScalarBlock").field("meta", &self.meta).finish()
    }
}

impl ScalarBlock {
    pub fn new<F>(value: F, bounds: Bounds, opts: TagOptions) -> Self
    where
        F: Fn(i64) -> f64 + Send + Sync + 'static,
    {
        Self {
            meta: Metadata::new(bounds, Tags::new(opts)),
            value: Arc::new(value),
        }
    }

    /// Scalar holding the same value at every step.
    pub fn constant(v: f64, bounds: Bounds, opts: TagOptions) -> Self {
        Self::new(move |_| v, bounds, opts)
    }

    pub fn value_at(&self, time_ms: i64) -> f64 {
        (self.value)(time_ms)
    }
}

impl Block for ScalarBlock {
    fn kind(&self) -> BlockKind {
        BlockKind::Scalar
    }

    fn meta(&self) -> &Metadata {
        &self.meta
    }

    fn series_meta(&self) -> &[SeriesMeta] {
        &[]
    }

    fn step_iter(&self) -> Result<Box<dyn StepIter + '_>> {
        Ok(Box::new(ScalarStepIter {
            block: self,
            next: 0,
            cur: None,
        }))
    }

    fn series_iter(&self) -> Result<Box<dyn SeriesIter + '_>> {
        Ok(Box::new(ScalarSeriesIter { block: self }))
    }
}

struct ScalarStepIter<'a> {
    block: &'a ScalarBlock,
    next: usize,
    cur: Option<(i64, [f64; 1])>,
}

impl StepIter for ScalarStepIter<'_> {
    fn advance(&mut self) -> bool {
        match self.block.meta.bounds.timestamp_at(self.next) {
            Some(ts) => {
                self.cur = Some((ts, [self.block.value_at(ts)]));
                self.next += 1;
                true
            }
            None => {
                self.cur = None;
                false
            }
        }
    }

    fn current(&self) -> Option<Step<'_>> {
        self.cur.as_ref().map(|(ts, v)| Step::new(*ts, v))
    }

    fn err(&self) -> Option<Error> {
        None
    }

    fn meta(&self) -> &Metadata {
        &self.block.meta
    }

    fn series_meta(&self) -> &[SeriesMeta] {
        &[]
    }
}

struct ScalarSeriesIter<'a> {
    block: &'a ScalarBlock,
}

impl SeriesIter for ScalarSeriesIter<'_> {
    fn advance(&mut self) -> bool {
        false
    }

    fn current(&self) -> Option<Series<'_>> {
        None
    }

    fn err(&self) -> Option<Error> {
        None
    }

    fn meta(&self) -> &Metadata {
        &self.block.meta
    }

    fn series_meta(&self) -> &[SeriesMeta] {
        &[]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_follows_time() {
        let bounds = Bounds::new(100, 10, 3).unwrap();
        let b = ScalarBlock::new(|t| t as f64 / 10.0, bounds, TagOptions::default());
        let mut it = b.step_iter().unwrap();
        let mut seen = Vec::new();
        while it.advance() {
            let s = it.current().unwrap();
            seen.push((s.time_ms(), s.values().to_vec()));
        }
        assert!(it.err().is_none());
        assert_eq!(
            seen,
            vec![(100, vec![10.0]), (110, vec![11.0]), (120, vec![12.0])]
        );
    }

    #[test]
    fn has_no_series() {
        let bounds = Bounds::new(0, 10, 2).unwrap();
        let b = ScalarBlock::constant(1.0, bounds, TagOptions::default());
        assert_eq!(b.kind(), BlockKind::Scalar);
        assert!(b.series_meta().is_empty());
        let mut it = b.series_iter().unwrap();
        assert!(!it.advance());
        assert!(it.current().is_none());
        assert!(it.err().is_none());
    }
}
