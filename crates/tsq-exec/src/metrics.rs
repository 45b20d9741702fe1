//! Metrics/tracing hooks.
//!
//! Events only; wire a subscriber (or an exporter) in the binary layer.

use std::time::Duration;

use tsq_core::id::{NodeId, QueryId};

use crate::runtime::QueryStats;

#[cfg(feature = "tracing")]
pub fn record_node(node: NodeId, op: &str, elapsed: Duration, scope_bytes: usize) {
    tracing::trace!(
        node = %node,
        op,
        elapsed_us = elapsed.as_micros() as u64,
        scope_bytes,
        "node processed"
    );
}

#[cfg(not(feature = "tracing"))]
pub fn record_node(_node: NodeId, _op: &str, _elapsed: Duration, _scope_bytes: usize) {
    /* no-op */
}

#[cfg(feature = "tracing")]
pub fn record_query(query: QueryId, stats: &QueryStats) {
    tracing::debug!(
        query = %query,
        plan = %stats.plan_fingerprint.short(),
        nodes = stats.nodes_executed,
        series = stats.series_out,
        peak_bytes = stats.peak_budget_bytes,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        "query finished"
    );
}

#[cfg(not(feature = "tracing"))]
pub fn record_query(_query: QueryId, _stats: &QueryStats) {
    /* no-op */
}
