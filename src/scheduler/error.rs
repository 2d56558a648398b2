//! Error types for the reversal scheduler

use thiserror::Error;

/// Errors raised by the durable store
#[derive(Debug, Error)]
pub enum StoreError {
    /// Reading or writing the backing file failed
    #[error("store I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Serializing the records failed
    #[error("store serialization error: {0}")]
    Serialization(#[from] serde_yaml::Error),
}

/// Errors raised by scheduler operations
#[derive(Debug, Error)]
pub enum SchedulerError {
    /// Invalid record state transition attempted
    #[error("invalid state transition")]
    InvalidStateTransition,

    /// The durable store failed; surfaced synchronously to the caller of
    /// schedule/cancel, never retried internally
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// The sweep task is not running
    #[error("scheduler task not started")]
    NotStarted,

    /// Generic error
    #[error("scheduler error: {0}")]
    Other(String),
}

impl From<String> for SchedulerError {
    fn from(message: String) -> Self {
        Self::Other(message)
    }
}

/// Result type for scheduler operations
pub type SchedulerResult<T> = Result<T, SchedulerError>;
