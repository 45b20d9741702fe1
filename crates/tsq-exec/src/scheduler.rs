//! Parallel DAG execution on tokio.
//!
//! Every scheduled node gets its own task and a `watch` channel announcing
//! its outcome. A task first waits for all of its inputs (re-checking the
//! query context every `join_poll_interval_ms`), then takes a semaphore
//! permit bounding concurrently running nodes to `max_parallel_tasks`, and
//! runs the operator on the blocking pool. The first failure aborts every
//! other task; tasks downstream of a failure stop without reporting one.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use tokio::sync::{watch, Semaphore};
use tokio::task::JoinSet;

use tsq_core::context::QueryContext;
use tsq_core::id::NodeId;
use tsq_core::plan::QueryPlan;

use crate::runtime::{finish, Engine, ExecError, QueryResult};
use crate::state::QueryState;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum NodeState {
    Pending,
    Done,
    Failed,
}

enum TaskFailure {
    /// An input failed or was aborted; the root cause is reported elsewhere.
    Upstream,
    Error(ExecError),
}

impl Engine {
    /// Run `plan`, executing independent branches concurrently.
    pub async fn execute_parallel(
        &self,
        ctx: &QueryContext,
        plan: &QueryPlan,
    ) -> Result<QueryResult, ExecError> {
        let ctx = self.effective_context(ctx);
        let started = Instant::now();
        let fingerprint = plan
            .fingerprint()
            .map_err(|e| ExecError::Plan(e.to_string()))?;
        let state = Arc::new(self.prepare(plan)?);
        let poll = Duration::from_millis(self.config().join_poll_interval_ms);
        let permits = Arc::new(Semaphore::new(self.config().max_parallel_tasks));

        #[cfg(feature = "tracing")]
        tracing::debug!(
            query = %ctx.id(),
            plan = %fingerprint.short(),
            nodes = state.order.len(),
            max_parallel = self.config().max_parallel_tasks,
            "executing plan in parallel"
        );

        let mut senders = HashMap::with_capacity(state.order.len());
        let mut receivers = HashMap::with_capacity(state.order.len());
        for id in &state.order {
            let (tx, rx) = watch::channel(NodeState::Pending);
            senders.insert(*id, tx);
            receivers.insert(*id, rx);
        }

        let mut tasks = JoinSet::new();
        for id in state.order.iter().copied() {
            let tx = senders
                .remove(&id)
                .ok_or_else(|| ExecError::Scheduler(format!("node {id} scheduled twice")))?;
            let mut upstream = Vec::new();
            for input in &state.node(id)?.inputs {
                let rx = receivers.get(input).ok_or_else(|| {
                    ExecError::Scheduler(format!("node {id} reads unscheduled input {input}"))
                })?;
                upstream.push(rx.clone());
            }

            let state = Arc::clone(&state);
            let ctx = ctx.clone();
            let permits = Arc::clone(&permits);
            tasks.spawn(async move {
                let res = run_task(state, ctx, permits, id, upstream, poll).await;
                let outcome = if res.is_ok() {
                    NodeState::Done
                } else {
                    NodeState::Failed
                };
                // No receiver left just means nobody downstream is waiting.
                let _ = tx.send(outcome);
                res
            });
        }
        drop(receivers);

        let mut failure: Option<ExecError> = None;
        let mut executed = 0;
        while let Some(joined) = tasks.join_next().await {
            let err = match joined {
                Ok(Ok(())) => {
                    executed += 1;
                    continue;
                }
                Ok(Err(TaskFailure::Upstream)) => continue,
                Ok(Err(TaskFailure::Error(e))) => e,
                Err(e) if e.is_cancelled() => continue,
                Err(e) => ExecError::Scheduler(format!("node task panicked: {e}")),
            };
            if failure.is_none() {
                #[cfg(feature = "tracing")]
                tracing::warn!(query = %ctx.id(), error = %err, "query aborted");
                tasks.abort_all();
                failure = Some(err);
            }
        }

        if let Some(e) = failure {
            return Err(e);
        }
        finish(&ctx, &state, fingerprint, executed, started)
    }
}

async fn run_task(
    state: Arc<QueryState>,
    ctx: QueryContext,
    permits: Arc<Semaphore>,
    id: NodeId,
    upstream: Vec<watch::Receiver<NodeState>>,
    poll: Duration,
) -> Result<(), TaskFailure> {
    for mut rx in upstream {
        loop {
            let current = *rx.borrow_and_update();
            match current {
                NodeState::Done => break,
                NodeState::Failed => return Err(TaskFailure::Upstream),
                NodeState::Pending => {}
            }
            ctx.check()
                .map_err(|e| TaskFailure::Error(ExecError::from_core(e)))?;
            match tokio::time::timeout(poll, rx.changed()).await {
                Ok(Ok(())) | Err(_) => {}
                Ok(Err(_)) => return Err(TaskFailure::Upstream),
            }
        }
    }

    let _permit = permits
        .acquire_owned()
        .await
        .map_err(|e| TaskFailure::Error(ExecError::Scheduler(e.to_string())))?;
    ctx.check()
        .map_err(|e| TaskFailure::Error(ExecError::from_core(e)))?;

    tokio::task::spawn_blocking(move || state.run_node(&ctx, id))
        .await
        .map_err(|e| TaskFailure::Error(ExecError::Scheduler(format!("node {id}: {e}"))))?
        .map_err(TaskFailure::Error)
}
