use core::time::Duration;

use thiserror::Error;

/// Ticket pool errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TicketsError {
    #[error("the ticket pool can not be initialized with zero tickets")]
    ZeroTotal,
    #[error("the ticket pool is already initialized (total: {0})")]
    AlreadyActive(u32),
    #[error("the ticket pool is not initialized")]
    Inactive,
}

/// Generator parameters validation errors.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ParamError {
    #[error("invalid timeout: {0:?}, must be positive")]
    InvalidTimeout(Duration),
    #[error("invalid duration: {0:?}, must be positive")]
    InvalidDuration(Duration),
    #[error("result channel is already closed")]
    ClosedResultChannel,
    #[error("explicit concurrency is required when the rate is unlimited (lps = 0)")]
    MissingConcurrency,
    #[error("no tokio runtime is running")]
    NoRuntime,
}

/// Generator construction errors.
#[derive(Debug, Error)]
pub enum Error {
    #[error(transparent)]
    Param(#[from] ParamError),
    #[error(transparent)]
    Tickets(#[from] TicketsError),
}

/// Errors reported by a [`Caller`](crate::caller::Caller).
#[derive(Debug, Error)]
pub enum CallError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("timed out after {0:?}")]
    Timeout(Duration),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
    #[error("{0}")]
    Other(String),
}
