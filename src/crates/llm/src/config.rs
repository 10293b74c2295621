//! Client configuration.

use std::time::Duration;

/// Configuration for [`RemoteLlmClient`](crate::RemoteLlmClient).
#[derive(Debug, Clone)]
pub struct RemoteLlmConfig {
    /// Bearer token for the API.
    pub api_key: String,
    /// Base URL, e.g. `https://api.openai.com/v1`.
    pub base_url: String,
    /// Model used for plain completions.
    pub model: String,
    /// Model used when web search is requested; falls back to `model`
    /// when the search variant errors.
    pub search_model: String,
    /// Per-request timeout.
    pub timeout: Duration,
}

impl RemoteLlmConfig {
    pub fn new(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        model: impl Into<String>,
    ) -> Self {
        let model = model.into();
        Self {
            api_key: api_key.into(),
            base_url: base_url.into(),
            search_model: format!("{model}-search-preview"),
            model,
            timeout: Duration::from_secs(600),
        }
    }

    pub fn with_search_model(mut self, search_model: impl Into<String>) -> Self {
        self.search_model = search_model.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}
