//! LLM client error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, LlmError>;

/// Errors raised by chat-completion clients.
#[derive(Error, Debug)]
pub enum LlmError {
    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// The API rejected the credentials.
    #[error("authentication failed: {0}")]
    Authentication(String),

    /// The API throttled the request.
    #[error("rate limited: {0}")]
    RateLimit(String),

    /// The input exceeded the model's context window. Callers shrink
    /// their corpus and retry; every other error is final for a node.
    #[error("input exceeds model context window: {0}")]
    ContextTooLong(String),

    /// The API returned a non-success status.
    #[error("LLM API error {status}: {message}")]
    Api { status: u16, message: String },

    /// The response body could not be interpreted.
    #[error("invalid LLM response: {0}")]
    InvalidResponse(String),
}

/// Message fragments that identify a context-window overflow across the
/// API variants we talk to.
const CONTEXT_LENGTH_MARKERS: &[&str] = &[
    "exceeds maximum",
    "context length",
    "context_length_exceeded",
    "Token indices sequence length",
];

impl LlmError {
    /// Classify an API error message, promoting context-window
    /// overflows to [`LlmError::ContextTooLong`].
    pub fn from_api(status: u16, message: String) -> Self {
        if CONTEXT_LENGTH_MARKERS.iter().any(|m| message.contains(m)) {
            return LlmError::ContextTooLong(message);
        }
        match status {
            401 | 403 => LlmError::Authentication(message),
            429 => LlmError::RateLimit(message),
            _ => LlmError::Api { status, message },
        }
    }

    pub fn is_context_too_long(&self) -> bool {
        matches!(self, LlmError::ContextTooLong(_))
    }
}
