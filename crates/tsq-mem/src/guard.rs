//! MemoryBudget + RAII guard implementations.
//!
//! Controllers must acquire a guard before handing out a builder. The guard
//! travels into the sealed block; dropping the last block reference returns
//! the bytes to the budget (panic-safe).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use tsq_core::budget::{BudgetGuard, MemoryBudget};

use crate::error::{Error, Result};
use crate::tracking::PeakTracker;

/// Shared inner state for the budget.
#[derive(Debug)]
struct BudgetInner {
    capacity: usize,
    used: AtomicUsize,
}

impl BudgetInner {
    fn new(capacity: usize) -> Self {
        Self {
            capacity,
            used: AtomicUsize::new(0),
        }
    }

    fn try_acquire(&self, bytes: usize) -> bool {
        loop {
            let cur = self.used.load(Ordering::Relaxed);
            let next = cur.saturating_add(bytes);
            if next > self.capacity {
                return false;
            }
            if self
                .used
                .compare_exchange(cur, next, Ordering::AcqRel, Ordering::Relaxed)
                .is_ok()
            {
                return true;
            }
        }
    }

    fn release(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Accounting for one query on top of the engine-wide budget.
#[derive(Debug, Default)]
struct ScopeInner {
    used: AtomicUsize,
    peak: PeakTracker,
}

impl ScopeInner {
    fn add(&self, bytes: usize) {
        let now = self.used.fetch_add(bytes, Ordering::AcqRel) + bytes;
        self.peak.record_used(now);
    }

    fn sub(&self, bytes: usize) {
        self.used.fetch_sub(bytes, Ordering::AcqRel);
    }
}

/// Concrete MemoryBudget implementation used by the engine.
#[derive(Debug, Clone)]
pub struct MemoryBudgetImpl {
    inner: Arc<BudgetInner>,
}

impl MemoryBudgetImpl {
    pub fn new(capacity_bytes: usize) -> Self {
        Self {
            inner: Arc::new(BudgetInner::new(capacity_bytes)),
        }
    }

    /// Current usage (advisory).
    pub fn used_bytes(&self) -> usize {
        self.inner.used.load(Ordering::Relaxed)
    }

    pub fn capacity_bytes(&self) -> usize {
        self.inner.capacity
    }

    /// Start accounting for one query. Guards from the scope count against
    /// both the scope and this budget.
    pub fn scoped(&self) -> ScopedBudget {
        ScopedBudget {
            parent: self.clone(),
            scope: Arc::new(ScopeInner::default()),
        }
    }

    fn acquire_in(
        &self,
        bytes: usize,
        tag: &'static str,
        scope: Option<&Arc<ScopeInner>>,
    ) -> Option<BudgetGuardImpl> {
        if bytes > 0 && !self.inner.try_acquire(bytes) {
            return None;
        }
        if let Some(scope) = scope {
            scope.add(bytes);
        }
        Some(BudgetGuardImpl {
            inner: Arc::clone(&self.inner),
            scope: scope.cloned(),
            bytes,
            tag,
        })
    }
}

/// Query-scoped view of a `MemoryBudgetImpl`.
#[derive(Debug, Clone)]
pub struct ScopedBudget {
    parent: MemoryBudgetImpl,
    scope: Arc<ScopeInner>,
}

impl ScopedBudget {
    /// Like `try_acquire`, but reports a refusal as an error.
    pub fn acquire(&self, bytes: usize, tag: &'static str) -> Result<BudgetGuardImpl> {
        self.try_acquire(bytes, tag)
            .ok_or_else(|| Error::BudgetExceeded {
                tag,
                requested: bytes,
                capacity: self.parent.capacity_bytes(),
                used: self.parent.used_bytes(),
            })
    }

    /// Bytes held by this query's live guards.
    pub fn scope_used_bytes(&self) -> usize {
        self.scope.used.load(Ordering::Relaxed)
    }

    /// Highest `scope_used_bytes` ever observed.
    pub fn peak_bytes(&self) -> usize {
        self.scope.peak.peak()
    }
}

/// RAII guard that accounts for a number of bytes.
/// Dropping it returns bytes to the budget.
#[derive(Debug)]
pub struct BudgetGuardImpl {
    inner: Arc<BudgetInner>,
    scope: Option<Arc<ScopeInner>>,
    bytes: usize,
    tag: &'static str,
}

impl Drop for BudgetGuardImpl {
    fn drop(&mut self) {
        if self.bytes > 0 {
            self.inner.release(self.bytes);
            if let Some(scope) = &self.scope {
                scope.sub(self.bytes);
            }
            // NOTE: do not log here to keep drop path fast.
            self.bytes = 0;
        }
    }
}

// ----- trait impls -----

impl BudgetGuard for BudgetGuardImpl {
    fn bytes(&self) -> usize {
        self.bytes
    }
    fn tag(&self) -> &'static str {
        self.tag
    }
}

impl BudgetGuardImpl {
    /// Try to resize this guard to a new byte count.
    /// Returns true if successful, false if the new size would exceed capacity.
    /// If new_bytes < current bytes, the guard is always shrunk successfully.
    pub fn try_resize(&mut self, new_bytes: usize) -> bool {
        if new_bytes == self.bytes {
            return true;
        }

        if new_bytes < self.bytes {
            let delta = self.bytes - new_bytes;
            self.inner.release(delta);
            if let Some(scope) = &self.scope {
                scope.sub(delta);
            }
            self.bytes = new_bytes;
            true
        } else {
            let delta = new_bytes - self.bytes;
            if self.inner.try_acquire(delta) {
                if let Some(scope) = &self.scope {
                    scope.add(delta);
                }
                self.bytes = new_bytes;
                true
            } else {
                false
            }
        }
    }
}

impl MemoryBudget for MemoryBudgetImpl {
    type Guard = BudgetGuardImpl;

    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard> {
        self.acquire_in(bytes, tag, None)
    }

    fn capacity_bytes(&self) -> usize {
        self.inner.capacity
    }

    fn used_bytes(&self) -> usize {
        self.inner.used.load(Ordering::Relaxed)
    }
}

impl MemoryBudget for ScopedBudget {
    type Guard = BudgetGuardImpl;

    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard> {
        self.parent.acquire_in(bytes, tag, Some(&self.scope))
    }

    fn capacity_bytes(&self) -> usize {
        self.parent.capacity_bytes()
    }

    fn used_bytes(&self) -> usize {
        self.parent.used_bytes()
    }
}
