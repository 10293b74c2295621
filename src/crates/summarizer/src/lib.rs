//! Summarization service over a single heavy model.
//!
//! Many producers submit [`SummarizationRequest`]s; one worker serves
//! them in priority order (lower value first, FIFO within a priority)
//! and publishes responses keyed by request id. Requests may carry a
//! deadline; the worker fails expired requests at dequeue time without
//! touching the model. When the queue drains and idle unload is
//! enabled, the model is released and reloaded on the next request.

pub mod error;
pub mod model;
pub mod service;
pub mod text;

pub use error::SummarizerError;
pub use model::{MockModel, RemoteSummarizationModel, SummarizationModel};
pub use service::{SummarizerConfig, SummarizerService};

use std::time::Instant;

use uuid::Uuid;

/// A queued summarization request.
#[derive(Debug, Clone)]
pub struct SummarizationRequest {
    pub request_id: Uuid,
    /// Lower value = served first.
    pub priority: i32,
    pub text: String,
    /// Target maximum summary length in model tokens.
    pub max_len: usize,
    /// Target minimum summary length in model tokens.
    pub min_len: usize,
    /// Requests past this instant are failed at dequeue.
    pub deadline: Option<Instant>,
}

/// The worker's answer to one request.
#[derive(Debug)]
pub struct SummarizationResponse {
    pub request_id: Uuid,
    pub outcome: Result<String, SummarizerError>,
}

impl SummarizationResponse {
    pub fn summary(&self) -> Option<&str> {
        self.outcome.as_deref().ok()
    }
}
