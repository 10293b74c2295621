//! Web search engine interface and per-query fan-out.

use std::collections::HashSet;
use std::sync::OnceLock;

use async_trait::async_trait;
use parking_lot::Mutex;
use regex::Regex;
use serde::Deserialize;

use crate::error::{Result, SearchError};

/// One raw search result before scraping.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SearchHit {
    pub url: String,
    pub display_url: String,
    pub title: String,
    pub snippet: String,
}

/// A per-query web search backend.
#[async_trait]
pub trait WebSearchEngine: Send + Sync {
    async fn search(&self, query: &str, num_results: usize) -> Result<Vec<SearchHit>>;
}

/// Issue every query concurrently and merge the hits, keeping the first
/// occurrence of each URL. A failed query is logged and skipped; the
/// remaining queries still contribute.
pub async fn collect_hits(
    engine: &dyn WebSearchEngine,
    queries: &[String],
    num_results: usize,
) -> Vec<SearchHit> {
    let searches = queries.iter().map(|q| engine.search(q, num_results));
    let outcomes = futures::future::join_all(searches).await;

    let mut seen: HashSet<String> = HashSet::new();
    let mut merged = Vec::new();
    for (query, outcome) in queries.iter().zip(outcomes) {
        match outcome {
            Ok(hits) => {
                for hit in hits {
                    if seen.insert(hit.url.clone()) {
                        merged.push(hit);
                    }
                }
            }
            Err(e) => tracing::warn!(query, error = %e, "search query failed"),
        }
    }
    merged
}

/// Shorten a URL for display: strip the protocol and `www.`, keep the
/// first characters and surface the trailing extension when present.
pub fn format_display_url(url: &str) -> String {
    static PREFIX: OnceLock<Regex> = OnceLock::new();
    static EXT: OnceLock<Regex> = OnceLock::new();
    let prefix = PREFIX
        .get_or_init(|| Regex::new(r"^(https?://)?(www\.)?").expect("prefix pattern compiles"));
    let ext = EXT.get_or_init(|| Regex::new(r"\.([a-zA-Z0-9]+)$").expect("ext pattern compiles"));

    let cleaned = prefix.replace(url, "");
    let extension = ext.captures(&cleaned).and_then(|c| c.get(1)).map(|m| m.as_str().to_string());
    let short: String = cleaned.chars().take(10).collect();
    match extension {
        Some(e) => format!("{short}---.{e}"),
        None => format!("{short}---"),
    }
}

/// Client for a JSON custom-search API (`?q=&key=&cx=&num=` returning
/// an `items` list).
pub struct HttpSearchEngine {
    endpoint: String,
    api_key: String,
    cse_id: String,
    client: reqwest::Client,
}

impl HttpSearchEngine {
    pub fn new(
        endpoint: impl Into<String>,
        api_key: impl Into<String>,
        cse_id: impl Into<String>,
    ) -> Self {
        Self {
            endpoint: endpoint.into(),
            api_key: api_key.into(),
            cse_id: cse_id.into(),
            client: reqwest::Client::new(),
        }
    }
}

#[derive(Deserialize)]
struct SearchReply {
    #[serde(default)]
    items: Vec<SearchItem>,
}

#[derive(Deserialize)]
struct SearchItem {
    link: String,
    #[serde(default, rename = "displayLink")]
    display_link: String,
    #[serde(default)]
    title: String,
    #[serde(default)]
    snippet: String,
}

#[async_trait]
impl WebSearchEngine for HttpSearchEngine {
    async fn search(&self, query: &str, num_results: usize) -> Result<Vec<SearchHit>> {
        let response = self
            .client
            .get(&self.endpoint)
            .query(&[
                ("q", query),
                ("key", &self.api_key),
                ("cx", &self.cse_id),
                ("num", &num_results.to_string()),
            ])
            .send()
            .await?;

        if !response.status().is_success() {
            return Err(SearchError::Engine(format!(
                "search API returned {} for '{query}'",
                response.status()
            )));
        }

        let reply: SearchReply =
            response.json().await.map_err(|e| SearchError::InvalidResponse(e.to_string()))?;

        Ok(reply
            .items
            .into_iter()
            .map(|item| {
                let display_url = if item.display_link.is_empty() {
                    format_display_url(&item.link)
                } else {
                    item.display_link
                };
                SearchHit { url: item.link, display_url, title: item.title, snippet: item.snippet }
            })
            .collect())
    }
}

/// Fixed-response engine for tests: every query returns the same hits,
/// and the queries asked are recorded.
pub struct MockSearchEngine {
    hits: Vec<SearchHit>,
    queries: Mutex<Vec<String>>,
}

impl MockSearchEngine {
    pub fn new(hits: Vec<SearchHit>) -> Self {
        Self { hits, queries: Mutex::new(Vec::new()) }
    }

    pub fn queries(&self) -> Vec<String> {
        self.queries.lock().clone()
    }
}

#[async_trait]
impl WebSearchEngine for MockSearchEngine {
    async fn search(&self, query: &str, num_results: usize) -> Result<Vec<SearchHit>> {
        self.queries.lock().push(query.to_string());
        Ok(self.hits.iter().take(num_results).cloned().collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hit(url: &str) -> SearchHit {
        SearchHit {
            url: url.to_string(),
            display_url: format_display_url(url),
            title: format!("title for {url}"),
            snippet: "snippet".to_string(),
        }
    }

    #[tokio::test]
    async fn duplicate_urls_across_queries_are_dropped() {
        let engine = MockSearchEngine::new(vec![hit("https://a.example/x"), hit("https://b.example/y")]);
        let queries = vec!["q1".to_string(), "q2".to_string()];
        let merged = collect_hits(&engine, &queries, 5).await;

        // Both queries return the same two hits; only two survive.
        assert_eq!(merged.len(), 2);
        assert_eq!(engine.queries(), vec!["q1", "q2"]);
    }

    #[test]
    fn display_url_is_shortened() {
        assert_eq!(format_display_url("https://www.example.com/report.pdf"), "example.co---.pdf");
        assert_eq!(format_display_url("http://a.io/x"), "a.io/x---");
    }

    #[test]
    fn search_reply_parses_items() {
        let raw = r#"{"items": [{"link": "https://x.example/doc", "displayLink": "x.example", "title": "Doc", "snippet": "..."}]}"#;
        let reply: SearchReply = serde_json::from_str(raw).unwrap();
        assert_eq!(reply.items.len(), 1);
        assert_eq!(reply.items[0].link, "https://x.example/doc");
    }
}
