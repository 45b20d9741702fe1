#![forbid(unsafe_code)]
//! tsq: block-based time-series query execution.
//!
//! Facade over the workspace crates:
//! - `core`: tags, blocks, cursors, builders, plans, query context;
//! - `mem`: the engine memory budget;
//! - `operators`: the operator contract and built-in operators;
//! - `exec`: the engine and its executors.

pub use tsq_core as core;
pub use tsq_exec as exec;
pub use tsq_mem as mem;
pub use tsq_operators as operators;

pub use tsq_core::context::QueryContext;
pub use tsq_core::plan::{PlanNode, QueryPlan};
pub use tsq_exec::{Engine, ExecError, QueryResult, QueryStats};
