//! The aggregation pipeline.

use std::sync::Arc;
use std::time::{Duration, Instant};

use llm::LlmClient;
use report_core::OnlineResource;
use summarizer::text::{chunk_by_tokens, token_count};
use summarizer::{SummarizerError, SummarizerService};
use tokio::task::JoinSet;

use crate::detect::detect_resource_kind;
use crate::engine::{collect_hits, SearchHit, WebSearchEngine};
use crate::error::Result;
use crate::scrape::Scraper;
use crate::synthesizer::QuerySynthesizer;

/// Texts that mean a scrape hit a paywall or archival interstitial
/// rather than the article body.
const PAYWALL_MARKERS: &[&str] = &[
    "Please enable JavaScript",
    "Subscribe to read",
    "Sign in to continue reading",
    "archive.today",
];

/// Tunables for [`SearchAggregator`].
#[derive(Debug, Clone)]
pub struct AggregatorConfig {
    /// Results requested per synthesized query.
    pub num_results_per_query: usize,
    /// Per-resource scrape timeout.
    pub per_scrape_timeout: Duration,
    /// Wall-clock cap over the whole scraping fan-out; workers still
    /// running at the cap are terminated.
    pub global_scrape_cap: Duration,
    /// Bodies above this many tokens are summarized chunk by chunk.
    pub chunk_token_threshold: usize,
    /// Run one more summarization pass over the concatenated chunk
    /// summaries.
    pub recombine_chunks: bool,
    /// Priority for summarization requests (lower = sooner).
    pub summary_priority: i32,
    /// Deadline budget for each summarization request.
    pub summary_deadline: Option<Duration>,
    pub summary_max_len: usize,
    pub summary_min_len: usize,
    /// Fallback body length (chars) when summarization fails.
    pub fallback_chars: usize,
}

impl Default for AggregatorConfig {
    fn default() -> Self {
        Self {
            num_results_per_query: 5,
            per_scrape_timeout: Duration::from_secs(100),
            global_scrape_cap: Duration::from_secs(500),
            chunk_token_threshold: 500,
            recombine_chunks: true,
            summary_priority: 10,
            summary_deadline: Some(Duration::from_secs(120)),
            summary_max_len: 300,
            summary_min_len: 30,
            fallback_chars: 1000,
        }
    }
}

impl AggregatorConfig {
    pub fn with_num_results(mut self, n: usize) -> Self {
        self.num_results_per_query = n;
        self
    }

    pub fn with_per_scrape_timeout(mut self, timeout: Duration) -> Self {
        self.per_scrape_timeout = timeout;
        self
    }

    pub fn with_global_cap(mut self, cap: Duration) -> Self {
        self.global_scrape_cap = cap;
        self
    }

    pub fn with_chunk_threshold(mut self, tokens: usize) -> Self {
        self.chunk_token_threshold = tokens;
        self
    }
}

/// Aggregates online resources for one (general, particular) query pair.
///
/// HTTP clients are created per aggregation and dropped with it; the
/// summarizer service is shared across all aggregations of a run.
pub struct SearchAggregator {
    general_prompt: String,
    particular_prompt: String,
    config: AggregatorConfig,
    llm: Arc<dyn LlmClient>,
    engine: Arc<dyn WebSearchEngine>,
    scraper: Arc<dyn Scraper>,
    summarizer: SummarizerService,
}

impl SearchAggregator {
    pub fn new(
        general_prompt: impl Into<String>,
        particular_prompt: impl Into<String>,
        config: AggregatorConfig,
        llm: Arc<dyn LlmClient>,
        engine: Arc<dyn WebSearchEngine>,
        scraper: Arc<dyn Scraper>,
        summarizer: SummarizerService,
    ) -> Self {
        Self {
            general_prompt: general_prompt.into(),
            particular_prompt: particular_prompt.into(),
            config,
            llm,
            engine,
            scraper,
            summarizer,
        }
    }

    /// The composite prompt handed to query synthesis.
    pub fn composed_prompt(&self) -> String {
        format!(
            "{}\nIn our case the subject matter we are talking about is: {} {{{}}}",
            self.general_prompt, self.particular_prompt, self.general_prompt
        )
    }

    /// Run the full pipeline and return the surviving resources.
    ///
    /// Every emitted resource carries non-empty summarized text and a
    /// URL unique within this aggregation.
    pub async fn aggregate(&self) -> Result<Vec<OnlineResource>> {
        let synthesizer = QuerySynthesizer::new(Arc::clone(&self.llm));
        let queries = synthesizer.generate_search_prompts(&self.composed_prompt()).await;
        for (i, query) in queries.iter().enumerate() {
            tracing::info!(n = i + 1, query, "search query");
        }

        let hits = collect_hits(&*self.engine, &queries, self.config.num_results_per_query).await;
        if hits.is_empty() {
            tracing::info!("no search hits discovered");
            return Ok(Vec::new());
        }
        tracing::info!(count = hits.len(), "deduplicated search hits");

        let client = reqwest::Client::new();
        let mut tasks = JoinSet::new();
        for hit in hits {
            let config = self.config.clone();
            let client = client.clone();
            let scraper = Arc::clone(&self.scraper);
            let summarizer = self.summarizer.clone();
            tasks.spawn(process_hit(hit, config, client, scraper, summarizer));
        }

        let deadline = Instant::now() + self.config.global_scrape_cap;
        let mut resources: Vec<OnlineResource> = Vec::new();
        loop {
            let remaining = deadline.saturating_duration_since(Instant::now());
            if remaining.is_zero() {
                tracing::warn!("global scrape cap reached, terminating remaining workers");
                tasks.abort_all();
                break;
            }
            match tokio::time::timeout(remaining, tasks.join_next()).await {
                Ok(Some(Ok(Some(resource)))) => resources.push(resource),
                Ok(Some(Ok(None))) => {}
                Ok(Some(Err(e))) => tracing::warn!(error = %e, "scrape task aborted"),
                Ok(None) => break,
                Err(_) => {
                    tracing::warn!("global scrape cap reached, terminating remaining workers");
                    tasks.abort_all();
                    break;
                }
            }
        }

        tracing::info!(emitted = resources.len(), "aggregation finished");
        Ok(resources)
    }
}

/// Scrape and summarize one hit. Returns `None` when the resource is
/// dropped (timeout, failure, empty or paywalled body).
async fn process_hit(
    hit: SearchHit,
    config: AggregatorConfig,
    client: reqwest::Client,
    scraper: Arc<dyn Scraper>,
    summarizer: SummarizerService,
) -> Option<OnlineResource> {
    let kind = detect_resource_kind(&client, &hit.url).await;

    let scraped =
        match tokio::time::timeout(config.per_scrape_timeout, scraper.extract(&hit.url, kind))
            .await
        {
            Err(_) => {
                tracing::warn!(url = %hit.url, "scrape timed out, dropping resource");
                return None;
            }
            Ok(Err(e)) => {
                tracing::warn!(url = %hit.url, error = %e, "scrape failed, dropping resource");
                return None;
            }
            Ok(Ok(text)) => text,
        };

    if scraped.trim().is_empty() {
        return None;
    }
    let head: String = scraped.chars().take(40).collect();
    if head.contains("archive.today") {
        tracing::debug!(url = %hit.url, "archive banner detected, dropping resource");
        return None;
    }

    let summarized = summarize_body(&summarizer, &scraped, &config).await;
    if summarized.trim().is_empty() || PAYWALL_MARKERS.iter().any(|m| summarized.contains(m)) {
        return None;
    }

    Some(OnlineResource {
        url: hit.url,
        display_url: hit.display_url,
        title: hit.title,
        snippet: hit.snippet,
        scrapped_text: summarized,
        extension: kind,
    })
}

/// Summarize a scraped body, chunking it when it exceeds the threshold.
/// Summarizer failures degrade to a truncated raw body so the resource
/// still carries something useful.
async fn summarize_body(
    service: &SummarizerService,
    text: &str,
    config: &AggregatorConfig,
) -> String {
    let deadline = config.summary_deadline.map(|budget| Instant::now() + budget);
    let await_budget = config.summary_deadline.map(|d| d + Duration::from_secs(30));

    if token_count(text) <= config.chunk_token_threshold {
        return match summarize_once(service, text, config, deadline, await_budget).await {
            Ok(summary) => summary,
            Err(e) => {
                tracing::warn!(error = %e, "summarization failed, using truncated body");
                text.chars().take(config.fallback_chars).collect()
            }
        };
    }

    let chunks = chunk_by_tokens(text, config.chunk_token_threshold);
    let ids: Vec<_> = chunks
        .iter()
        .map(|chunk| {
            service.submit(
                chunk.clone(),
                config.summary_priority,
                config.summary_max_len,
                config.summary_min_len,
                deadline,
            )
        })
        .collect();

    let mut summaries = Vec::new();
    for id in ids {
        let response = service.await_response(id, await_budget).await;
        match response.outcome {
            Ok(summary) => summaries.push(summary),
            Err(e) => tracing::warn!(error = %e, "chunk summarization failed, skipping chunk"),
        }
    }

    if summaries.is_empty() {
        return text.chars().take(config.fallback_chars).collect();
    }

    let combined = summaries.join("\n\n");
    if config.recombine_chunks && summaries.len() > 1 {
        match summarize_once(service, &combined, config, deadline, await_budget).await {
            Ok(summary) => summary,
            Err(_) => combined,
        }
    } else {
        combined
    }
}

async fn summarize_once(
    service: &SummarizerService,
    text: &str,
    config: &AggregatorConfig,
    deadline: Option<Instant>,
    await_budget: Option<Duration>,
) -> std::result::Result<String, SummarizerError> {
    let id = service.submit(
        text,
        config.summary_priority,
        config.summary_max_len,
        config.summary_min_len,
        deadline,
    );
    service.await_response(id, await_budget).await.outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::{format_display_url, MockSearchEngine};
    use crate::scrape::{MockScrape, MockScraper};
    use llm::MockLlm;
    use std::collections::HashMap;
    use summarizer::{MockModel, SummarizerConfig};

    fn hit(url: &str) -> SearchHit {
        SearchHit {
            url: url.to_string(),
            display_url: format_display_url(url),
            title: format!("title {url}"),
            snippet: "snippet".to_string(),
        }
    }

    fn spawn_summarizer() -> SummarizerService {
        SummarizerService::spawn(Arc::new(MockModel::new()), SummarizerConfig::default())
    }

    fn aggregator(
        hits: Vec<SearchHit>,
        script: HashMap<String, MockScrape>,
        config: AggregatorConfig,
    ) -> (SearchAggregator, Arc<MockSearchEngine>) {
        let engine = Arc::new(MockSearchEngine::new(hits));
        let agg = SearchAggregator::new(
            "general prompt",
            "Acme Corp",
            config,
            Arc::new(MockLlm::with_response("not json")),
            Arc::clone(&engine) as Arc<dyn WebSearchEngine>,
            Arc::new(MockScraper::new(script)),
            spawn_summarizer(),
        );
        (agg, engine)
    }

    #[tokio::test]
    async fn slow_scrape_is_dropped_without_deadlock() {
        let urls = ["https://a.example/1.html", "https://b.example/2.html", "https://c.example/3.html"];
        let mut script = HashMap::new();
        script.insert(urls[0].to_string(), MockScrape::Body("first article body".into()));
        script.insert(urls[1].to_string(), MockScrape::Body("second article body".into()));
        script.insert(urls[2].to_string(), MockScrape::Hang(Duration::from_secs(30)));

        let config = AggregatorConfig::default()
            .with_per_scrape_timeout(Duration::from_millis(100))
            .with_global_cap(Duration::from_secs(5));
        let (agg, _) = aggregator(urls.iter().map(|u| hit(u)).collect(), script, config);

        let resources = agg.aggregate().await.unwrap();
        assert_eq!(resources.len(), 2);
        let mut urls_out: Vec<_> = resources.iter().map(|r| r.url.as_str()).collect();
        urls_out.sort();
        assert_eq!(urls_out, vec![urls[0], urls[1]]);
        assert!(resources.iter().all(|r| !r.scrapped_text.trim().is_empty()));
    }

    #[tokio::test]
    async fn archive_banner_body_is_dropped() {
        let url = "https://archived.example/x.html";
        let mut script = HashMap::new();
        script.insert(url.to_string(), MockScrape::Body("archive.today banner page".into()));

        let (agg, _) = aggregator(vec![hit(url)], script, AggregatorConfig::default());
        let resources = agg.aggregate().await.unwrap();
        assert!(resources.is_empty());
    }

    #[tokio::test]
    async fn long_bodies_are_chunk_summarized() {
        let url = "https://long.example/doc.html";
        let body = "many words of article text flow here ".repeat(200);
        let mut script = HashMap::new();
        script.insert(url.to_string(), MockScrape::Body(body));

        let config = AggregatorConfig::default().with_chunk_threshold(100);
        let (agg, _) = aggregator(vec![hit(url)], script, config);
        let resources = agg.aggregate().await.unwrap();

        assert_eq!(resources.len(), 1);
        assert!(resources[0].scrapped_text.starts_with("Summary:"));
    }

    #[tokio::test]
    async fn synthesis_fallback_still_drives_six_queries() {
        let url = "https://a.example/p.html";
        let mut script = HashMap::new();
        script.insert(url.to_string(), MockScrape::Body("body text".into()));

        let (agg, engine) = aggregator(vec![hit(url)], script, AggregatorConfig::default());
        agg.aggregate().await.unwrap();

        // MockLlm answered garbage, so the six stock variations ran.
        assert_eq!(engine.queries().len(), 6);
    }

    #[tokio::test]
    async fn no_hits_yields_empty_result() {
        let (agg, _) = aggregator(Vec::new(), HashMap::new(), AggregatorConfig::default());
        let resources = agg.aggregate().await.unwrap();
        assert!(resources.is_empty());
    }

    #[tokio::test]
    async fn summarizer_failure_falls_back_to_truncated_body() {
        let url = "https://a.example/p.html";
        let mut script = HashMap::new();
        script.insert(url.to_string(), MockScrape::Body("raw body text ".repeat(10)));

        let model = Arc::new(MockModel::new());
        model.set_failing(true);
        let engine = Arc::new(MockSearchEngine::new(vec![hit(url)]));
        let agg = SearchAggregator::new(
            "general",
            "particular",
            AggregatorConfig::default(),
            Arc::new(MockLlm::with_response("not json")),
            engine as Arc<dyn WebSearchEngine>,
            Arc::new(MockScraper::new(script)),
            SummarizerService::spawn(model, SummarizerConfig::default()),
        );

        let resources = agg.aggregate().await.unwrap();
        assert_eq!(resources.len(), 1);
        assert!(resources[0].scrapped_text.starts_with("raw body text"));
    }
}
