//! Financial numeric context lookup.
//!
//! When a run is flagged `is_company`, a numeric context block (ticker
//! data, headline figures) is fetched once at run start and threaded
//! into every node's chat history. The lookup itself is an external
//! collaborator behind [`FinancialDataProvider`].

use std::time::Duration;

use async_trait::async_trait;
use serde::Deserialize;

use crate::{OrchestratorError, Result};

/// Marker an implementation may return when no data exists for the
/// focus; the orchestrator treats it like an absent context.
pub const INFO_NOT_FOUND: &str = "INFO_NOT_FOUND";

#[async_trait]
pub trait FinancialDataProvider: Send + Sync {
    /// Numeric context text for the focus (a company name).
    async fn numeric_context(&self, focus: &str) -> Result<String>;
}

/// HTTP lookup with retry and exponential backoff.
pub struct RemoteFinancialData {
    endpoint: String,
    client: reqwest::Client,
    max_retries: u32,
    initial_delay: Duration,
}

#[derive(Deserialize)]
struct FinanceReply {
    #[serde(default)]
    context: String,
}

impl RemoteFinancialData {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            client: reqwest::Client::new(),
            max_retries: 3,
            initial_delay: Duration::from_secs(2),
        }
    }

    pub fn with_retries(mut self, max_retries: u32, initial_delay: Duration) -> Self {
        self.max_retries = max_retries;
        self.initial_delay = initial_delay;
        self
    }
}

#[async_trait]
impl FinancialDataProvider for RemoteFinancialData {
    async fn numeric_context(&self, focus: &str) -> Result<String> {
        let mut delay = self.initial_delay;
        let mut last_error = String::new();

        for attempt in 0..self.max_retries {
            if attempt > 0 {
                // Up to 25% jitter keeps retries from synchronizing.
                let jitter = delay.mul_f64(0.25 * rand::random::<f64>());
                tokio::time::sleep(delay + jitter).await;
                delay *= 2;
            }

            let request = self.client.get(&self.endpoint).query(&[("q", focus)]);
            match request.send().await {
                Ok(response) if response.status().is_success() => {
                    let reply: FinanceReply = response
                        .json()
                        .await
                        .map_err(|e| OrchestratorError::Finance(e.to_string()))?;
                    return Ok(reply.context);
                }
                Ok(response) => {
                    last_error = format!("status {}", response.status());
                    tracing::warn!(
                        attempt = attempt + 1,
                        status = %response.status(),
                        "financial lookup returned an error status"
                    );
                }
                Err(e) => {
                    last_error = e.to_string();
                    tracing::warn!(attempt = attempt + 1, error = %e, "financial lookup failed");
                }
            }
        }

        Err(OrchestratorError::Finance(format!(
            "lookup failed after {} attempts: {last_error}",
            self.max_retries
        )))
    }
}

/// Fixed-answer provider for tests and offline runs.
pub struct StaticFinancialData {
    context: String,
}

impl StaticFinancialData {
    pub fn new(context: impl Into<String>) -> Self {
        Self { context: context.into() }
    }
}

#[async_trait]
impl FinancialDataProvider for StaticFinancialData {
    async fn numeric_context(&self, _focus: &str) -> Result<String> {
        Ok(self.context.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn static_provider_answers() {
        let provider = StaticFinancialData::new("Revenue: 10M");
        assert_eq!(provider.numeric_context("Acme").await.unwrap(), "Revenue: 10M");
    }

    #[tokio::test]
    async fn remote_provider_gives_up_after_retries() {
        let provider = RemoteFinancialData::new("http://127.0.0.1:1/finance")
            .with_retries(2, Duration::from_millis(1));
        let err = provider.numeric_context("Acme").await.unwrap_err();
        assert!(matches!(err, OrchestratorError::Finance(_)));
    }
}
