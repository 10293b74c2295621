//! The heavy model behind the service, as a trait.
//!
//! The service only ever sees this interface; the real model lives in a
//! separate process reached over HTTP, and tests plug in [`MockModel`].

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::SummarizerError;

/// A summarization model with explicit load/unload lifecycle.
#[async_trait]
pub trait SummarizationModel: Send + Sync {
    /// Bring the model into memory. Idempotent.
    async fn load(&self) -> Result<(), SummarizerError>;

    /// Release model resources. Idempotent.
    async fn unload(&self);

    /// Fraction of device memory currently in use, `0.0..=1.0`.
    fn memory_pressure(&self) -> f32;

    async fn summarize(
        &self,
        text: &str,
        max_len: usize,
        min_len: usize,
    ) -> Result<String, SummarizerError>;
}

/// HTTP client for a summarization model served out-of-process.
pub struct RemoteSummarizationModel {
    endpoint: String,
    client: reqwest::Client,
}

#[derive(Serialize)]
struct SummarizeBody<'a> {
    text: &'a str,
    max_length: usize,
    min_length: usize,
}

#[derive(Deserialize)]
struct SummarizeReply {
    summary_text: String,
}

impl RemoteSummarizationModel {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self { endpoint: endpoint.into(), client: reqwest::Client::new() }
    }
}

#[async_trait]
impl SummarizationModel for RemoteSummarizationModel {
    async fn load(&self) -> Result<(), SummarizerError> {
        // The remote process manages its own weights.
        Ok(())
    }

    async fn unload(&self) {}

    fn memory_pressure(&self) -> f32 {
        0.0
    }

    async fn summarize(
        &self,
        text: &str,
        max_len: usize,
        min_len: usize,
    ) -> Result<String, SummarizerError> {
        let body = SummarizeBody { text, max_length: max_len, min_length: min_len };
        let response = self
            .client
            .post(&self.endpoint)
            .json(&body)
            .send()
            .await
            .map_err(|e| SummarizerError::Model(e.to_string()))?;

        if !response.status().is_success() {
            return Err(SummarizerError::Model(format!(
                "summarization endpoint returned {}",
                response.status()
            )));
        }

        let reply: SummarizeReply =
            response.json().await.map_err(|e| SummarizerError::Model(e.to_string()))?;
        Ok(reply.summary_text)
    }
}

/// Deterministic in-memory model for tests and offline runs.
pub struct MockModel {
    fail: AtomicBool,
    pressure_high: AtomicBool,
    loads: AtomicU32,
    unloads: AtomicU32,
}

impl MockModel {
    pub fn new() -> Self {
        Self {
            fail: AtomicBool::new(false),
            pressure_high: AtomicBool::new(false),
            loads: AtomicU32::new(0),
            unloads: AtomicU32::new(0),
        }
    }

    /// Make subsequent `summarize` calls fail.
    pub fn set_failing(&self, fail: bool) {
        self.fail.store(fail, Ordering::Relaxed);
    }

    /// Simulate device memory above the high-water mark.
    pub fn set_pressure_high(&self, high: bool) {
        self.pressure_high.store(high, Ordering::Relaxed);
    }

    pub fn load_count(&self) -> u32 {
        self.loads.load(Ordering::Relaxed)
    }

    pub fn unload_count(&self) -> u32 {
        self.unloads.load(Ordering::Relaxed)
    }
}

impl Default for MockModel {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl SummarizationModel for MockModel {
    async fn load(&self) -> Result<(), SummarizerError> {
        self.loads.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }

    async fn unload(&self) {
        self.unloads.fetch_add(1, Ordering::Relaxed);
    }

    fn memory_pressure(&self) -> f32 {
        if self.pressure_high.load(Ordering::Relaxed) {
            0.99
        } else {
            0.1
        }
    }

    async fn summarize(
        &self,
        text: &str,
        _max_len: usize,
        _min_len: usize,
    ) -> Result<String, SummarizerError> {
        if self.fail.load(Ordering::Relaxed) {
            return Err(SummarizerError::Model("mock model failure".to_string()));
        }
        let head: Vec<&str> = text.split_whitespace().take(8).collect();
        Ok(format!("Summary: {}", head.join(" ")))
    }
}
