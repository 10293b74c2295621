//! Search pipeline error types.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors raised across the aggregation pipeline.
///
/// Scrape and synthesis failures are recovered locally (the resource is
/// dropped, stock queries are substituted); only endpoint discovery and
/// engine-level failures surface to the caller.
#[derive(Error, Debug)]
pub enum SearchError {
    /// The LLM did not produce a usable set of search queries.
    #[error("query synthesis failed: {0}")]
    SynthesisFailed(String),

    /// The search engine rejected or failed a query.
    #[error("search engine error: {0}")]
    Engine(String),

    /// A scrape exceeded its per-resource timeout.
    #[error("scrape timed out for {url}")]
    ScrapeTimeout { url: String },

    /// A scrape worker failed or produced no text.
    #[error("scrape failed for {url}: {reason}")]
    ScrapeFailed { url: String, reason: String },

    /// No candidate search endpoint reported healthy within the budget.
    #[error("no search endpoint became healthy within the budget")]
    EndpointUnavailable,

    /// Transport-level failure.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// A collaborator answered with an uninterpretable body.
    #[error("invalid response: {0}")]
    InvalidResponse(String),
}
