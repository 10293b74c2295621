//! Summarizer error types.

use std::time::Duration;

use thiserror::Error;
use uuid::Uuid;

/// Per-request failures; one request's error never affects the others.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SummarizerError {
    /// The model raised while summarizing.
    #[error("model error: {0}")]
    Model(String),

    /// The request's deadline had elapsed when it was dequeued.
    #[error("deadline expired before the request was served")]
    DeadlineExpired,

    /// The service shut down with the request still queued.
    #[error("service shut down before the request was served")]
    Cancelled,

    /// No response arrived within the await timeout.
    #[error("no response within {0:?}")]
    AwaitTimeout(Duration),

    /// The request id was never submitted (or already awaited).
    #[error("unknown request id {0}")]
    UnknownRequest(Uuid),
}
