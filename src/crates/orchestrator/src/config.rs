//! Run configuration and collaborator wiring.

use std::sync::Arc;
use std::time::Duration;

use llm::LlmClient;
use report_core::OnlineData;
use summarizer::SummarizerService;
use websearch::{
    discover_endpoint, AggregatorConfig, RemoteAggregatorClient, RemoteSearchConfig,
    Scraper, SearchAggregator, WebSearchEngine,
};

use crate::finance::FinancialDataProvider;
use crate::Result;

/// Per-run flags, as submitted by the client.
#[derive(Debug, Clone, Copy, Default)]
pub struct RunOptions {
    /// Answer every node from the canned mock completion; no search,
    /// no real LLM.
    pub mock: bool,
    /// Gather online data for every non-system node.
    pub web_search: bool,
    /// Fetch a financial numeric context for the focus once at run
    /// start and thread it into every node's history.
    pub is_company: bool,
}

impl RunOptions {
    pub fn mock() -> Self {
        Self { mock: true, ..Self::default() }
    }

    pub fn with_web_search(mut self, web_search: bool) -> Self {
        self.web_search = web_search;
        self
    }

    pub fn with_is_company(mut self, is_company: bool) -> Self {
        self.is_company = is_company;
        self
    }
}

/// Engine tunables for one orchestrator.
#[derive(Debug, Clone)]
pub struct RunConfig {
    /// Bound on the context-shrink retry loop around LLM calls.
    pub max_llm_retries: usize,
    /// Use the web-search LLM variant for node completions (truncates
    /// the history to the first two messages plus the last one).
    pub use_search_variant: bool,
    /// Interval between health polls during endpoint discovery.
    pub health_poll_interval: Duration,
    /// Total budget for endpoint discovery before a node fails.
    pub health_poll_budget: Duration,
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            max_llm_retries: 5,
            use_search_variant: false,
            health_poll_interval: Duration::from_secs(10),
            health_poll_budget: Duration::from_secs(120),
        }
    }
}

impl RunConfig {
    pub fn with_max_llm_retries(mut self, retries: usize) -> Self {
        self.max_llm_retries = retries;
        self
    }

    pub fn with_search_variant(mut self, on: bool) -> Self {
        self.use_search_variant = on;
        self
    }

    pub fn with_health_poll(mut self, interval: Duration, budget: Duration) -> Self {
        self.health_poll_interval = interval;
        self.health_poll_budget = budget;
        self
    }
}

/// Where a node's online data comes from.
#[derive(Clone)]
pub enum OnlineDataSource {
    /// No search at all; nodes run on ancestor context alone.
    Disabled,
    /// Run the aggregation pipeline in-process.
    Local {
        config: AggregatorConfig,
        engine: Arc<dyn WebSearchEngine>,
        scraper: Arc<dyn Scraper>,
        summarizer: SummarizerService,
    },
    /// Discover a healthy aggregation service and post the request to it.
    Remote { candidates: Vec<String>, config: RemoteSearchConfig },
}

impl OnlineDataSource {
    /// Gather online data for one node's prompts.
    pub async fn fetch(
        &self,
        llm: &Arc<dyn LlmClient>,
        general: &str,
        particular: &str,
        run_config: &RunConfig,
    ) -> Result<OnlineData> {
        match self {
            OnlineDataSource::Disabled => Ok(OnlineData::default()),
            OnlineDataSource::Local { config, engine, scraper, summarizer } => {
                let aggregator = SearchAggregator::new(
                    general,
                    particular,
                    config.clone(),
                    Arc::clone(llm),
                    Arc::clone(engine),
                    Arc::clone(scraper),
                    summarizer.clone(),
                );
                let results = aggregator.aggregate().await?;
                Ok(OnlineData { results })
            }
            OnlineDataSource::Remote { candidates, config } => {
                let endpoint = discover_endpoint(
                    candidates,
                    run_config.health_poll_interval,
                    run_config.health_poll_budget,
                )
                .await?;
                let client = RemoteAggregatorClient::new(endpoint, config.clone())?;
                Ok(client.aggregate(general, particular).await?)
            }
        }
    }
}

/// The external services one orchestrator talks to.
#[derive(Clone)]
pub struct Collaborators {
    pub llm: Arc<dyn LlmClient>,
    pub search: OnlineDataSource,
    pub finance: Arc<dyn FinancialDataProvider>,
}
