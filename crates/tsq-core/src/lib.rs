#![forbid(unsafe_code)]
//! tsq-core: the data model shared by every tsq crate.
//!
//! - `tags` / `dedupe`: tag sets and hoisting of shared tags;
//! - `block`: blocks, cursors and the block builder;
//! - `plan`: the operator DAG description the engine consumes;
//! - `context`: per-query cancellation and deadline.
//!
//! No async, no I/O here; exec drives everything.

pub mod block;
pub mod budget;
pub mod config;
pub mod context;
pub mod dedupe;
pub mod error;
pub mod hash;
pub mod id;
pub mod plan;
pub mod prelude;
pub mod tags;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
