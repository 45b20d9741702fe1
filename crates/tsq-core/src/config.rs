//! Engine configuration that downstream crates can serialize/deserialize.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::tags::TagOptions;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Hard memory cap (in bytes) for block values built during one engine's lifetime.
    pub mem_cap_bytes: usize,

    /// Execution parallelism. The parallel scheduler never runs more nodes at once.
    pub max_parallel_tasks: usize,

    /// Default per-query timeout applied when the caller's context has no deadline.
    pub query_timeout_ms: Option<u64>,

    /// How often a node waiting at a join re-checks cancellation.
    pub join_poll_interval_ms: u64,

    /// Upper bound on series in any block an operator builds. 0 disables it.
    pub max_series_per_block: usize,

    /// Name of the tag holding the metric name.
    pub metric_name_tag: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            mem_cap_bytes: 512 * 1024 * 1024, // 512 MiB default
            max_parallel_tasks: 4,
            query_timeout_ms: None,
            join_poll_interval_ms: 10,
            max_series_per_block: 0,
            metric_name_tag: "__name__".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a config from environment variables, falling back to defaults.
    ///
    /// Environment variables:
    /// - `TSQ_MEM_CAP_BYTES`: memory cap in bytes
    /// - `TSQ_MAX_PARALLEL_TASKS`: max parallel tasks
    /// - `TSQ_QUERY_TIMEOUT_MS`: default query timeout
    /// - `TSQ_JOIN_POLL_INTERVAL_MS`: cancellation poll interval at joins
    /// - `TSQ_MAX_SERIES_PER_BLOCK`: series limit per built block
    /// - `TSQ_METRIC_NAME_TAG`: metric name tag
    pub fn from_env() -> Self {
        let mut cfg = Self::default();

        if let Ok(s) = std::env::var("TSQ_MEM_CAP_BYTES") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.mem_cap_bytes = v;
            }
        }

        if let Ok(s) = std::env::var("TSQ_MAX_PARALLEL_TASKS") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_parallel_tasks = v;
            }
        }

        if let Ok(s) = std::env::var("TSQ_QUERY_TIMEOUT_MS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.query_timeout_ms = Some(v);
            }
        }

        if let Ok(s) = std::env::var("TSQ_JOIN_POLL_INTERVAL_MS") {
            if let Ok(v) = s.parse::<u64>() {
                cfg.join_poll_interval_ms = v;
            }
        }

        if let Ok(s) = std::env::var("TSQ_MAX_SERIES_PER_BLOCK") {
            if let Ok(v) = s.parse::<usize>() {
                cfg.max_series_per_block = v;
            }
        }

        if let Ok(s) = std::env::var("TSQ_METRIC_NAME_TAG") {
            cfg.metric_name_tag = s;
        }

        cfg
    }

    pub fn validate(&self) -> Result<()> {
        if self.max_parallel_tasks == 0 {
            return Err(Error::Config("max_parallel_tasks must be at least 1".into()));
        }
        if self.join_poll_interval_ms == 0 {
            return Err(Error::Config("join_poll_interval_ms must be positive".into()));
        }
        if self.metric_name_tag.is_empty() {
            return Err(Error::Config("metric_name_tag cannot be empty".into()));
        }
        Ok(())
    }

    /// Query-independent options handed to every node at instantiation.
    pub fn transform_options(&self) -> Result<TransformOptions> {
        Ok(TransformOptions {
            tag_options: TagOptions::with_metric_name(self.metric_name_tag.as_bytes())?,
            max_series_per_block: (self.max_series_per_block > 0)
                .then_some(self.max_series_per_block),
        })
    }
}

/// Options a node receives from the engine. Never mutated by nodes.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransformOptions {
    pub tag_options: TagOptions,
    pub max_series_per_block: Option<usize>,
}
