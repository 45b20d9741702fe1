//! Leaf operator: resolve a storage key into a block.
//!
//! Storage adapters are pluggable; `MemoryStorage` keeps prepared blocks in a
//! map and backs the tests.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, RwLock};

use serde::{Deserialize, Serialize};

use tsq_core::block::Block;
use tsq_core::config::TransformOptions;
use tsq_core::context::QueryContext;
use tsq_core::id::NodeId;

use crate::controller::Controller;
use crate::traits::{expect_arity, OpError, OpNode, Params};

pub const FETCH_TYPE: &str = "fetch";

/// Source of leaf blocks.
pub trait Storage: Send + Sync {
    fn fetch(&self, ctx: &QueryContext, key: &str) -> Result<Arc<dyn Block>, OpError>;
}

/// Thread-safe in-memory storage keyed by string.
#[derive(Clone, Default)]
pub struct MemoryStorage {
    blocks: Arc<RwLock<HashMap<String, Arc<dyn Block>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-populate a block under `key`, replacing any previous one.
    pub fn insert(&self, key: impl Into<String>, block: Arc<dyn Block>) {
        let mut blocks = self.blocks.write().unwrap_or_else(|p| p.into_inner());
        blocks.insert(key.into(), block);
    }

    pub fn contains(&self, key: &str) -> bool {
        let blocks = self.blocks.read().unwrap_or_else(|p| p.into_inner());
        blocks.contains_key(key)
    }

    pub fn len(&self) -> usize {
        let blocks = self.blocks.read().unwrap_or_else(|p| p.into_inner());
        blocks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        let mut blocks = self.blocks.write().unwrap_or_else(|p| p.into_inner());
        blocks.clear();
    }
}

impl Storage for MemoryStorage {
    fn fetch(&self, ctx: &QueryContext, key: &str) -> Result<Arc<dyn Block>, OpError> {
        ctx.check()?;
        let blocks = self
            .blocks
            .read()
            .map_err(|_| OpError::Storage("memory storage poisoned".into()))?;
        blocks
            .get(key)
            .cloned()
            .ok_or_else(|| OpError::Storage(format!("key not found: {key}")))
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FetchParams {
    pub key: String,
}

impl FetchParams {
    pub fn new(key: impl Into<String>) -> Self {
        Self { key: key.into() }
    }

    pub fn from_config(config: &serde_json::Value) -> Result<Self, OpError> {
        let params: FetchParams =
            serde_json::from_value(config.clone()).map_err(|e| OpError::Params {
                op: FETCH_TYPE.into(),
                reason: e.to_string(),
            })?;
        if params.key.is_empty() {
            return Err(OpError::Params {
                op: FETCH_TYPE.into(),
                reason: "key cannot be empty".into(),
            });
        }
        Ok(params)
    }
}

impl fmt::Display for FetchParams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(key={:?})", FETCH_TYPE, self.key)
    }
}

impl Params for FetchParams {
    fn op_type(&self) -> &'static str {
        FETCH_TYPE
    }

    fn arity(&self) -> usize {
        0
    }

    fn node(&self, controller: Controller, _options: &TransformOptions) -> Box<dyn OpNode> {
        Box::new(FetchNode {
            params: self.clone(),
            controller,
        })
    }
}

pub struct FetchNode {
    params: FetchParams,
    controller: Controller,
}

impl OpNode for FetchNode {
    fn params(&self) -> &dyn Params {
        &self.params
    }

    fn process(
        &self,
        ctx: &QueryContext,
        _id: NodeId,
        inputs: &[Arc<dyn Block>],
    ) -> Result<(), OpError> {
        expect_arity(FETCH_TYPE, 0, inputs)?;
        let block = self.controller.storage()?.fetch(ctx, &self.params.key)?;
        self.controller.process(ctx, block)
    }
}
