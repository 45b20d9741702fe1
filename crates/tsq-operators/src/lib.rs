#![forbid(unsafe_code)]
//! tsq-operators: the operator contract and the built-in operators.
//!
//! Design intent:
//! - Synchronous and pure; exec decides when and where nodes run.
//! - Every block an operator builds goes through its `Controller`, which
//!   charges the query's memory budget and enforces the series limit.
//! - `absent` is the reference single-input operator; `add`/`sub`/`mul`/`div`
//!   exercise two-input joins; `fetch` is the leaf.

pub mod absent;
pub mod binary;
pub mod controller;
pub mod fetch;
pub mod registry;
pub mod traits;

pub use absent::AbsentParams;
pub use binary::{ArithOp, BinaryParams};
pub use controller::{BlockSink, CollectingSink, Controller};
pub use fetch::{FetchParams, MemoryStorage, Storage};
pub use registry::Registry;
pub use traits::{process_simple_block, OpError, OpNode, Params, SimpleOpNode};
