//! Convenient re-exports for downstream crates.

pub use crate::block::{
    Block, BlockBuilder, BlockKind, Bounds, ColumnBlock, Metadata, ScalarBlock, Series,
    SeriesIter, SeriesMeta, Step, StepIter,
};
pub use crate::config::{EngineConfig, TransformOptions};
pub use crate::context::QueryContext;
pub use crate::dedupe::dedupe_metadata;
pub use crate::error::{Error, Result};
pub use crate::id::{NodeId, QueryId};
pub use crate::plan::{PlanNode, QueryPlan};
pub use crate::tags::{Tag, TagOptions, Tags};
