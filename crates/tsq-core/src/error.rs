use thiserror::Error;

/// Canonical result for core.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the block model.
///
/// `Clone` because iterators hand their recorded failure out through `err()`
/// without giving up ownership of it.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum Error {
    #[error("Invalid configuration: {0}")]
    Config(String),

    #[error("Invalid tags: {0}")]
    Tags(String),

    #[error("Invalid bounds: {0}")]
    Bounds(String),

    /// Misuse of a `BlockBuilder`; a contract violation, never retried.
    #[error("Block construction error: {0}")]
    Construction(String),

    /// Upstream data became unreadable or inconsistent mid-iteration.
    #[error("Iteration error: {0}")]
    Iteration(String),

    #[error("Plan error: {0}")]
    Plan(String),

    #[error("Hashing error: {0}")]
    Hash(String),

    #[error("query {0} canceled")]
    Canceled(String),

    #[error("query {0} exceeded its deadline")]
    DeadlineExceeded(String),

    #[error("Internal invariant failed: {0}")]
    Invariant(String),
}

impl Error {
    /// True for the two outcomes a caller should treat as "abandoned" rather
    /// than "broken".
    pub fn is_cancellation(&self) -> bool {
        matches!(self, Error::Canceled(_) | Error::DeadlineExceeded(_))
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::Hash(e.to_string())
    }
}
