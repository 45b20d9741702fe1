//! Operator type name -> parameter factory.
//!
//! The engine resolves every plan node through a `Registry`. Built-ins are
//! registered by `Registry::new`; embedders add their own with `register`.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::absent::{AbsentParams, ABSENT_TYPE};
use crate::binary::{ArithOp, BinaryParams};
use crate::fetch::{FetchParams, FETCH_TYPE};
use crate::traits::{OpError, Params};

pub type ParamsFactory =
    Arc<dyn Fn(&serde_json::Value) -> Result<Arc<dyn Params>, OpError> + Send + Sync>;

#[derive(Clone)]
pub struct Registry {
    factories: BTreeMap<String, ParamsFactory>,
}

impl Default for Registry {
    fn default() -> Self {
        Self::new()
    }
}

impl Registry {
    pub fn new() -> Self {
        let mut r = Self::empty();
        r.register(FETCH_TYPE, |cfg| {
            Ok(Arc::new(FetchParams::from_config(cfg)?) as Arc<dyn Params>)
        });
        r.register(ABSENT_TYPE, |cfg| {
            Ok(Arc::new(AbsentParams::from_config(cfg)?) as Arc<dyn Params>)
        });
        for op in ArithOp::ALL {
            r.register(op.name(), move |cfg| {
                Ok(Arc::new(BinaryParams::from_config(op, cfg)?) as Arc<dyn Params>)
            });
        }
        r
    }

    pub fn empty() -> Self {
        Self {
            factories: BTreeMap::new(),
        }
    }

    /// Register (or replace) the factory for `op_type`.
    pub fn register<F>(&mut self, op_type: impl Into<String>, factory: F)
    where
        F: Fn(&serde_json::Value) -> Result<Arc<dyn Params>, OpError> + Send + Sync + 'static,
    {
        self.factories.insert(op_type.into(), Arc::new(factory));
    }

    pub fn contains(&self, op_type: &str) -> bool {
        self.factories.contains_key(op_type)
    }

    /// Registered type names, sorted.
    pub fn op_types(&self) -> impl Iterator<Item = &str> {
        self.factories.keys().map(String::as_str)
    }

    /// Build the parameters for one plan node.
    pub fn make(&self, op_type: &str, config: &serde_json::Value) -> Result<Arc<dyn Params>, OpError> {
        let factory = self
            .factories
            .get(op_type)
            .ok_or_else(|| OpError::UnknownOp(op_type.to_string()))?;
        factory(config)
    }
}
