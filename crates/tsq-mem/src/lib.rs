#![forbid(unsafe_code)]
//! tsq-mem: hard memory budgeting for block values.
//!
//! This crate provides concrete implementations for the *interfaces* defined
//! in `tsq-core::budget`. Every builder handed out by a controller acquires a
//! guard here first, so the engine's memory ceiling holds with RAII guards.
//! A `ScopedBudget` additionally tracks one query's usage and peak.

pub mod error;
pub mod guard;
pub mod tracking;

pub use error::{Error, Result};
pub use guard::{BudgetGuardImpl, MemoryBudgetImpl, ScopedBudget};
pub use tracking::PeakTracker;
