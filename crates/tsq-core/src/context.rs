//! Per-query context threaded through every `process` call.
//!
//! Operators never look inside it beyond `check()`. Clones share the cancel
//! flag, so canceling any clone cancels the query.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use crate::error::{Error, Result};
use crate::id::QueryId;

#[derive(Debug, Clone)]
pub struct QueryContext {
    id: QueryId,
    deadline: Option<Instant>,
    canceled: Arc<AtomicBool>,
}

impl Default for QueryContext {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryContext {
    pub fn new() -> Self {
        Self {
            id: QueryId::new_v4(),
            deadline: None,
            canceled: Arc::new(AtomicBool::new(false)),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.deadline = Some(Instant::now() + timeout);
        self
    }

    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    pub fn id(&self) -> QueryId {
        self.id
    }

    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    pub fn cancel(&self) {
        self.canceled.store(true, Ordering::Release);
    }

    pub fn is_canceled(&self) -> bool {
        self.canceled.load(Ordering::Acquire)
    }

    /// `Ok` while the query may keep running.
    pub fn check(&self) -> Result<()> {
        if self.is_canceled() {
            return Err(Error::Canceled(self.id.to_string()));
        }
        if let Some(deadline) = self.deadline {
            if Instant::now() >= deadline {
                return Err(Error::DeadlineExceeded(self.id.to_string()));
            }
        }
        Ok(())
    }
}
