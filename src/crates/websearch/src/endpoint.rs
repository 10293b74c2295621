//! Search-service endpoint discovery and the remote aggregation client.
//!
//! The aggregation pipeline can also run behind an HTTP service. The
//! orchestrator discovers a live endpoint by polling candidate base
//! URLs' `/health` and then posts the aggregation request to it.

use std::time::{Duration, Instant};

use report_core::{OnlineData, OnlineResource};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SearchError};

/// Poll the candidates' `/health` until one answers `{"status":"ok"}`.
///
/// Candidates are probed in order, one round every `poll_interval`
/// (spec default: 10 s), until `budget` is spent.
pub async fn discover_endpoint(
    candidates: &[String],
    poll_interval: Duration,
    budget: Duration,
) -> Result<String> {
    let client = reqwest::Client::builder().timeout(Duration::from_secs(5)).build()?;
    let deadline = Instant::now() + budget;

    loop {
        for base in candidates {
            if health_ok(&client, base).await {
                tracing::info!(endpoint = %base, "search endpoint is healthy");
                return Ok(base.clone());
            }
        }
        if Instant::now() + poll_interval > deadline {
            tracing::error!("no search endpoint became healthy within the budget");
            return Err(SearchError::EndpointUnavailable);
        }
        tokio::time::sleep(poll_interval).await;
    }
}

async fn health_ok(client: &reqwest::Client, base: &str) -> bool {
    let url = format!("{}/health", base.trim_end_matches('/'));
    match client.get(&url).send().await {
        Ok(response) if response.status().is_success() => {
            match response.json::<HealthReply>().await {
                Ok(reply) => reply.status == "ok",
                Err(_) => false,
            }
        }
        Ok(response) => {
            tracing::debug!(url, status = %response.status(), "health check not ok");
            false
        }
        Err(e) => {
            tracing::debug!(url, error = %e, "health check unreachable");
            false
        }
    }
}

#[derive(Deserialize)]
struct HealthReply {
    #[serde(default)]
    status: String,
}

/// Connection parameters for [`RemoteAggregatorClient`].
#[derive(Debug, Clone)]
pub struct RemoteSearchConfig {
    /// Credentials blob passed through to the service (YAML or JSON).
    pub credentials: String,
    /// Scratch directory the service may use.
    pub operating_path: String,
    /// LLM endpoint the service uses for query synthesis.
    pub llm_api_url: String,
    /// Optional custom search engine id.
    pub cse_id: Option<String>,
    /// Whole-aggregation timeout.
    pub timeout: Duration,
}

impl Default for RemoteSearchConfig {
    fn default() -> Self {
        Self {
            credentials: String::new(),
            operating_path: "/tmp".to_string(),
            llm_api_url: String::new(),
            cse_id: None,
            timeout: Duration::from_secs(3600),
        }
    }
}

#[derive(Serialize)]
struct SearchApiRequest<'a> {
    credentials: &'a str,
    general_prompt: &'a str,
    particular_prompt: &'a str,
    operating_path: &'a str,
    llm_api_url: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    cse_id: Option<&'a str>,
}

#[derive(Deserialize)]
struct SearchApiResponse {
    #[serde(default)]
    results: Vec<OnlineResource>,
}

/// Client for an aggregation pipeline served out-of-process.
pub struct RemoteAggregatorClient {
    base_url: String,
    config: RemoteSearchConfig,
    client: reqwest::Client,
}

impl RemoteAggregatorClient {
    pub fn new(base_url: impl Into<String>, config: RemoteSearchConfig) -> Result<Self> {
        let client = reqwest::Client::builder().timeout(config.timeout).build()?;
        Ok(Self { base_url: base_url.into(), config, client })
    }

    /// Run one aggregation on the remote service.
    pub async fn aggregate(&self, general: &str, particular: &str) -> Result<OnlineData> {
        let url = format!("{}/search", self.base_url.trim_end_matches('/'));
        let body = SearchApiRequest {
            credentials: &self.config.credentials,
            general_prompt: general,
            particular_prompt: particular,
            operating_path: &self.config.operating_path,
            llm_api_url: &self.config.llm_api_url,
            cse_id: self.config.cse_id.as_deref(),
        };

        tracing::info!(%url, "posting aggregation request");
        let response = self.client.post(&url).json(&body).send().await?;
        if !response.status().is_success() {
            let status = response.status();
            let text = response.text().await.unwrap_or_default();
            return Err(SearchError::Engine(format!("search service returned {status}: {text}")));
        }

        let parsed: SearchApiResponse =
            response.json().await.map_err(|e| SearchError::InvalidResponse(e.to_string()))?;
        Ok(OnlineData { results: parsed.results })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn discovery_gives_up_after_the_budget() {
        let candidates = vec!["http://127.0.0.1:1".to_string()];
        let err = discover_endpoint(&candidates, Duration::from_millis(20), Duration::from_millis(60))
            .await
            .unwrap_err();
        assert!(matches!(err, SearchError::EndpointUnavailable));
    }

    #[test]
    fn request_wire_shape_matches_the_service() {
        let body = SearchApiRequest {
            credentials: "API_Keys: {}",
            general_prompt: "general",
            particular_prompt: "particular",
            operating_path: "/tmp",
            llm_api_url: "http://llm.example/api",
            cse_id: None,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["general_prompt"], "general");
        assert!(json.get("cse_id").is_none());
    }

    #[test]
    fn response_parses_resources() {
        let raw = r#"{"results": [{
            "url": "https://x.example/a",
            "display_url": "x.example",
            "title": "A",
            "snippet": "s",
            "scrapped_text": "body",
            "extension": "html"
        }]}"#;
        let parsed: SearchApiResponse = serde_json::from_str(raw).unwrap();
        assert_eq!(parsed.results.len(), 1);
        assert_eq!(parsed.results[0].scrapped_text, "body");
    }
}
