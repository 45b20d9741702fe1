//! Block-level and series-level metadata.

use serde::{Deserialize, Serialize};

use crate::block::bounds::Bounds;
use crate::tags::{TagOptions, Tags};

/// Data shared by every series in a block.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub bounds: Bounds,
    /// Block-common tags; their options govern every tag comparison in the block.
    pub tags: Tags,
}

impl Metadata {
    pub fn new(bounds: Bounds, tags: Tags) -> Self {
        Self { bounds, tags }
    }

    pub fn tag_options(&self) -> &TagOptions {
        self.tags.opts()
    }
}

/// Identity of one series; positionally aligned with the block's columns.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SeriesMeta {
    pub tags: Tags,
    pub name: Vec<u8>,
}

impl SeriesMeta {
    pub fn new(tags: Tags, name: impl Into<Vec<u8>>) -> Self {
        Self {
            tags,
            name: name.into(),
        }
    }
}
