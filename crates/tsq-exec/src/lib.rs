#![forbid(unsafe_code)]
//! tsq-exec: engine, executors and metrics.
//!
//! `Engine::execute` runs a plan sequentially on the caller's thread;
//! `Engine::execute_parallel` (feature `async-scheduler`) runs independent
//! branches concurrently on tokio. Both share node instantiation, output
//! slots and error reporting through `state::QueryState`.

pub mod metrics;
pub mod runtime;
#[cfg(feature = "async-scheduler")]
pub mod scheduler;
mod state;

#[cfg(test)]
mod testing;

pub use runtime::{Engine, ExecError, QueryResult, QueryStats};
