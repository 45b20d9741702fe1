//! Cursor-style iterators over a block.
//!
//! Protocol shared by both cursors:
//! - `advance()` moves to the next element and returns false once exhausted
//!   or failed;
//! - `current()` is only meaningful directly after `advance()` returned true;
//! - `err()` must be consulted after exhaustion: `None` means the data ended,
//!   `Some` means it broke.

use crate::block::meta::{Metadata, SeriesMeta};
use crate::error::Error;

/// One time step across every series of a block.
#[derive(Debug, Clone, Copy)]
pub struct Step<'a> {
    time_ms: i64,
    values: &'a [f64],
}

impl<'a> Step<'a> {
    pub fn new(time_ms: i64, values: &'a [f64]) -> Self {
        Self { time_ms, values }
    }

    pub fn time_ms(&self) -> i64 {
        self.time_ms
    }

    pub fn values(&self) -> &'a [f64] {
        self.values
    }
}

/// One series across every step of a block.
#[derive(Debug, Clone, Copy)]
pub struct Series<'a> {
    meta: &'a SeriesMeta,
    values: &'a [f64],
}

impl<'a> Series<'a> {
    pub fn new(meta: &'a SeriesMeta, values: &'a [f64]) -> Self {
        Self { meta, values }
    }

    pub fn meta(&self) -> &'a SeriesMeta {
        self.meta
    }

    pub fn values(&self) -> &'a [f64] {
        self.values
    }
}

pub trait StepIter: Send {
    fn advance(&mut self) -> bool;
    fn current(&self) -> Option<Step<'_>>;
    fn err(&self) -> Option<Error>;
    fn meta(&self) -> &Metadata;
    fn series_meta(&self) -> &[SeriesMeta];

    fn step_count(&self) -> usize {
        self.meta().bounds.steps()
    }
}

pub trait SeriesIter: Send {
    fn advance(&mut self) -> bool;
    fn current(&self) -> Option<Series<'_>>;
    fn err(&self) -> Option<Error>;
    fn meta(&self) -> &Metadata;
    fn series_meta(&self) -> &[SeriesMeta];

    fn series_count(&self) -> usize {
        self.series_meta().len()
    }
}
