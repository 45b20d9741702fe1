//! Matrix-backed block.
//!
//! Values are stored step-major in one contiguous buffer: step `i` occupies
//! `values[i * n .. (i + 1) * n]` for `n` series. Step iteration is a slice
//! walk; series iteration gathers one series at a time into a reused buffer.

use std::fmt;

use crate::block::iter::{Series, SeriesIter, Step, StepIter};
use crate::block::meta::{Metadata, SeriesMeta};
use crate::block::{Block, BlockKind};
use crate::budget::BudgetGuard;
use crate::error::{Error, Result};

pub struct ColumnBlock {
    meta: Metadata,
    series_meta: Vec<SeriesMeta>,
    values: Vec<f64>,
    /// Releases the accounted bytes when the last reference goes away.
    guard: Option<Box<dyn BudgetGuard>>,
}

impl fmt::Debug for ColumnBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ColumnBlock")
            .field("meta", &self.meta)
            .field("series", &self.series_meta.len())
            .field("accounted_bytes", &self.accounted_bytes())
            .finish()
    }
}

impl ColumnBlock {
    /// Wrap a step-major value buffer. The buffer length must equal
    /// `steps * series`.
    pub fn new(meta: Metadata, series_meta: Vec<SeriesMeta>, values: Vec<f64>) -> Result<Self> {
        let expected = meta.bounds.steps() * series_meta.len();
        if values.len() != expected {
            return Err(Error::Construction(format!(
                "expected {} values for {} steps x {} series, got {}",
                expected,
                meta.bounds.steps(),
                series_meta.len(),
                values.len()
            )));
        }
        Ok(Self {
            meta,
            series_meta,
            values,
            guard: None,
        })
    }

    /// Build from per-series rows; handy for storage adapters and tests.
    pub fn from_series(
        meta: Metadata,
        series_meta: Vec<SeriesMeta>,
        rows: Vec<Vec<f64>>,
    ) -> Result<Self> {
        let steps = meta.bounds.steps();
        let n = series_meta.len();
        if rows.len() != n {
            return Err(Error::Construction(format!(
                "{} series metas but {} value rows",
                n,
                rows.len()
            )));
        }
        if let Some((i, row)) = rows.iter().enumerate().find(|(_, r)| r.len() != steps) {
            return Err(Error::Construction(format!(
                "series {} has {} values, bounds declare {} steps",
                i,
                row.len(),
                steps
            )));
        }
        let mut values = Vec::with_capacity(steps * n);
        for step in 0..steps {
            values.extend(rows.iter().map(|r| r[step]));
        }
        Self::new(meta, series_meta, values)
    }

    pub(crate) fn with_guard(mut self, guard: Option<Box<dyn BudgetGuard>>) -> Self {
        self.guard = guard;
        self
    }

    pub fn accounted_bytes(&self) -> usize {
        self.guard.as_ref().map(|g| g.bytes()).unwrap_or(0)
    }

    pub fn series_count(&self) -> usize {
        self.series_meta.len()
    }

    pub fn value(&self, step: usize, series: usize) -> Option<f64> {
        if step >= self.meta.bounds.steps() || series >= self.series_meta.len() {
            return None;
        }
        self.values.get(step * self.series_meta.len() + series).copied()
    }

    fn step_values(&self, step: usize) -> &[f64] {
        let n = self.series_meta.len();
        &self.values[step * n..(step + 1) * n]
    }
}

impl Block for ColumnBlock {
    fn kind(&self) -> BlockKind {
        BlockKind::Column
    }

    fn meta(&self) -> &Metadata {
        &self.meta
    }

    fn series_meta(&self) -> &[SeriesMeta] {
        &self.series_meta
    }

    fn step_iter(&self) -> Result<Box<dyn StepIter + '_>> {
        Ok(Box::new(ColumnStepIter {
            block: self,
            next: 0,
            cur: None,
        }))
    }

    fn series_iter(&self) -> Result<Box<dyn SeriesIter + '_>> {
        Ok(Box::new(ColumnSeriesIter {
            block: self,
            next: 0,
            cur: None,
            buf: Vec::with_capacity(self.meta.bounds.steps()),
        }))
    }
}

struct ColumnStepIter<'a> {
    block: &'a ColumnBlock,
    next: usize,
    cur: Option<usize>,
}

impl StepIter for ColumnStepIter<'_> {
    fn advance(&mut self) -> bool {
        if self.next >= self.block.meta.bounds.steps() {
            self.cur = None;
            return false;
        }
        self.cur = Some(self.next);
        self.next += 1;
        true
    }

    fn current(&self) -> Option<Step<'_>> {
        let i = self.cur?;
        let ts = self.block.meta.bounds.timestamp_at(i)?;
        Some(Step::new(ts, self.block.step_values(i)))
    }

    fn err(&self) -> Option<Error> {
        None
    }

    fn meta(&self) -> &Metadata {
        &self.block.meta
    }

    fn series_meta(&self) -> &[SeriesMeta] {
        &self.block.series_meta
    }
}

struct ColumnSeriesIter<'a> {
    block: &'a ColumnBlock,
    next: usize,
    cur: Option<usize>,
    buf: Vec<f64>,
}

impl SeriesIter for ColumnSeriesIter<'_> {
    fn advance(&mut self) -> bool {
        let n = self.block.series_meta.len();
        if self.next >= n {
            self.cur = None;
            return false;
        }
        let s = self.next;
        self.buf.clear();
        self.buf
            .extend(self.block.values.iter().skip(s).step_by(n).copied());
        self.cur = Some(s);
        self.next += 1;
        true
    }

    fn current(&self) -> Option<Series<'_>> {
        let s = self.cur?;
        Some(Series::new(&self.block.series_meta[s], &self.buf))
    }

    fn err(&self) -> Option<Error> {
        None
    }

    fn meta(&self) -> &Metadata {
        &self.block.meta
    }

    fn series_meta(&self) -> &[SeriesMeta] {
        &self.block.series_meta
    }
}
