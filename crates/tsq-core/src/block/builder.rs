//! Write-once accumulator for column blocks.
//!
//! Columns are steps. `add_cols(n)` declares the step count once; afterwards
//! each `append_value(step, v)` appends the next series' value to column
//! `step`. Cells nobody wrote stay NaN. `build` consumes the builder, so a
//! sealed builder cannot be appended to again.

use crate::block::column::ColumnBlock;
use crate::block::meta::{Metadata, SeriesMeta};
use crate::budget::BudgetGuard;
use crate::error::{Error, Result};

pub struct BlockBuilder {
    meta: Metadata,
    series_meta: Vec<SeriesMeta>,
    columns: Option<Vec<Vec<f64>>>,
    guard: Option<Box<dyn BudgetGuard>>,
}

impl std::fmt::Debug for BlockBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockBuilder")
            .field("meta", &self.meta)
            .field("series_meta", &self.series_meta)
            .field("columns", &self.columns)
            .field("guard", &self.guard.is_some())
            .finish()
    }
}

impl BlockBuilder {
    pub fn new(meta: Metadata, series_meta: Vec<SeriesMeta>) -> Self {
        Self {
            meta,
            series_meta,
            columns: None,
            guard: None,
        }
    }

    /// Attach the budget guard covering this builder's output.
    pub fn with_guard(mut self, guard: Box<dyn BudgetGuard>) -> Self {
        self.guard = Some(guard);
        self
    }

    pub fn meta(&self) -> &Metadata {
        &self.meta
    }

    pub fn series_meta(&self) -> &[SeriesMeta] {
        &self.series_meta
    }

    /// Bytes a sealed block of `steps x series` will hold.
    pub fn estimate_bytes(steps: usize, series: usize) -> usize {
        steps
            .saturating_mul(series)
            .saturating_mul(std::mem::size_of::<f64>())
    }

    pub fn add_cols(&mut self, n: usize) -> Result<()> {
        if self.columns.is_some() {
            return Err(Error::Construction("columns already declared".into()));
        }
        let steps = self.meta.bounds.steps();
        if n != steps {
            return Err(Error::Construction(format!(
                "declared {n} columns but bounds have {steps} steps"
            )));
        }
        let width = self.series_meta.len();
        self.columns = Some((0..n).map(|_| Vec::with_capacity(width)).collect());
        Ok(())
    }

    fn column_mut(&mut self, step: usize) -> Result<&mut Vec<f64>> {
        let width = self.series_meta.len();
        let columns = self
            .columns
            .as_mut()
            .ok_or_else(|| Error::Construction("append before add_cols".into()))?;
        let n = columns.len();
        let col = columns.get_mut(step).ok_or_else(|| {
            Error::Construction(format!("step index {step} out of range for {n} columns"))
        })?;
        if col.len() >= width {
            return Err(Error::Construction(format!(
                "column {step} already holds {width} values"
            )));
        }
        Ok(col)
    }

    pub fn append_value(&mut self, step: usize, value: f64) -> Result<()> {
        self.column_mut(step)?.push(value);
        Ok(())
    }

    pub fn append_values(&mut self, step: usize, values: &[f64]) -> Result<()> {
        let width = self.series_meta.len();
        let col = self.column_mut(step)?;
        if col.len() + values.len() > width {
            return Err(Error::Construction(format!(
                "appending {} values to column {step} exceeds {width} series",
                values.len()
            )));
        }
        col.extend_from_slice(values);
        Ok(())
    }

    /// Append one whole series: one value to every column.
    pub fn append_series(&mut self, values: &[f64]) -> Result<()> {
        let steps = self.meta.bounds.steps();
        if values.len() != steps {
            return Err(Error::Construction(format!(
                "series has {} values, block has {steps} steps",
                values.len()
            )));
        }
        let width = self.series_meta.len();
        let columns = self
            .columns
            .as_mut()
            .ok_or_else(|| Error::Construction("append before add_cols".into()))?;
        let depth = columns.first().map(|c| c.len()).unwrap_or(0);
        if columns.iter().any(|c| c.len() != depth) {
            return Err(Error::Construction(
                "append_series on ragged columns".into(),
            ));
        }
        if depth >= width {
            return Err(Error::Construction(format!(
                "block already holds {width} series"
            )));
        }
        for (col, v) in columns.iter_mut().zip(values) {
            col.push(*v);
        }
        Ok(())
    }

    pub fn build(self) -> Result<ColumnBlock> {
        let columns = self
            .columns
            .ok_or_else(|| Error::Construction("build before add_cols".into()))?;
        let width = self.series_meta.len();
        let mut values = Vec::with_capacity(columns.len() * width);
        for mut col in columns {
            col.resize(width, f64::NAN);
            values.extend_from_slice(&col);
        }
        Ok(ColumnBlock::new(self.meta, self.series_meta, values)?.with_guard(self.guard))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::block::bounds::Bounds;
    use crate::block::Block;
    use crate::tags::{TagOptions, Tags};

    fn builder(series: usize, steps: usize) -> BlockBuilder {
        let opts = TagOptions::default();
        let meta = Metadata::new(Bounds::new(0, 1_000, steps).unwrap(), Tags::new(opts.clone()));
        let series_meta = (0..series)
            .map(|i| SeriesMeta::new(Tags::new(opts.clone()), format!("s{i}")))
            .collect();
        BlockBuilder::new(meta, series_meta)
    }

    #[test]
    fn append_before_cols_fails() {
        let mut b = builder(1, 3);
        assert!(matches!(b.append_value(0, 1.0), Err(Error::Construction(_))));
        assert!(matches!(b.append_series(&[1.0, 2.0, 3.0]), Err(Error::Construction(_))));
    }

    #[test]
    fn build_before_cols_fails() {
        assert!(matches!(builder(1, 3).build(), Err(Error::Construction(_))));
    }

    #[test]
    fn out_of_range_step_fails() {
        let mut b = builder(1, 3);
        b.add_cols(3).unwrap();
        assert!(matches!(b.append_value(3, 1.0), Err(Error::Construction(_))));
    }

    #[test]
    fn cols_must_match_bounds_and_be_declared_once() {
        let mut b = builder(1, 3);
        assert!(b.add_cols(2).is_err());
        b.add_cols(3).unwrap();
        assert!(b.add_cols(3).is_err());
    }

    #[test]
    fn overfull_column_fails() {
        let mut b = builder(1, 2);
        b.add_cols(2).unwrap();
        b.append_value(0, 1.0).unwrap();
        assert!(b.append_value(0, 2.0).is_err());
        assert!(b.append_values(1, &[1.0, 2.0]).is_err());
    }

    #[test]
    fn unwritten_cells_are_nan() {
        let mut b = builder(2, 3);
        b.add_cols(3).unwrap();
        b.append_value(0, 0.0).unwrap();
        b.append_values(2, &[5.0, 6.0]).unwrap();
        let block = b.build().unwrap();

        assert_eq!(block.value(0, 0), Some(0.0));
        assert!(block.value(0, 1).unwrap().is_nan());
        assert!(block.value(1, 0).unwrap().is_nan());
        assert_eq!(block.value(2, 1), Some(6.0));
        assert_eq!(block.series_meta().len(), 2);
    }

    #[test]
    fn append_series_fills_every_column() {
        let mut b = builder(2, 3);
        b.add_cols(3).unwrap();
        b.append_series(&[1.0, 2.0, 3.0]).unwrap();
        b.append_series(&[4.0, 5.0, 6.0]).unwrap();
        assert!(b.append_series(&[7.0, 8.0, 9.0]).is_err());
        let block = b.build().unwrap();

        let mut it = block.series_iter().unwrap();
        assert!(it.advance());
        assert_eq!(it.current().unwrap().values(), &[1.0, 2.0, 3.0]);
        assert!(it.advance());
        assert_eq!(it.current().unwrap().values(), &[4.0, 5.0, 6.0]);
        assert!(!it.advance());
    }

    #[test]
    fn zero_step_block_builds() {
        let mut b = builder(2, 0);
        b.add_cols(0).unwrap();
        let block = b.build().unwrap();
        let mut it = block.step_iter().unwrap();
        assert!(!it.advance());
    }
}
