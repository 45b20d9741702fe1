//! Memory accounting seams for block values.
//!
//! `tsq-mem` implements these. Builders and sealed blocks only need to hold
//! a guard, so core never depends on the accounting itself.

/// A guard returned by a memory budget when bytes are acquired.
///
/// The concrete type lives in `tsq-mem`. It must be RAII (releases on Drop).
/// Sealed blocks carry their guard and are shared across threads, hence `Sync`.
pub trait BudgetGuard: Send + Sync {
    /// Number of bytes currently accounted for by this guard.
    fn bytes(&self) -> usize;
    /// Operator type that reserved the bytes.
    fn tag(&self) -> &'static str {
        "guard"
    }
}

/// A handle representing a memory-cap enforcer.
///
/// Implemented by `tsq-mem`. Controllers call `try_acquire` before handing
/// out a builder. If `None` is returned the node fails; there is no spilling.
pub trait MemoryBudget: Send + Sync + 'static {
    type Guard: BudgetGuard;

    /// Attempt to acquire `bytes` from the live budget. Returns a guard on success.
    fn try_acquire(&self, bytes: usize, tag: &'static str) -> Option<Self::Guard>;

    /// Total configured capacity (bytes).
    fn capacity_bytes(&self) -> usize;

    /// Approximate currently used bytes (advisory; not a correctness API).
    fn used_bytes(&self) -> usize;
}
