//! Scraper interface and the subprocess implementation.
//!
//! Scraping runs in an isolated worker process so that a hang or crash
//! in one resource never wedges the aggregator. The orchestration side
//! only sees the [`Scraper`] trait.

use std::collections::HashMap;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use report_core::ResourceKind;
use tokio::process::Command;

use crate::error::{Result, SearchError};

/// Extracts the text body of a URL.
#[async_trait]
pub trait Scraper: Send + Sync {
    async fn extract(&self, url: &str, kind: ResourceKind) -> Result<String>;
}

/// Configuration for [`ProcessScraper`].
#[derive(Debug, Clone)]
pub struct ScrapeConfig {
    /// Worker command; the resource kind and URL are appended as the
    /// final two arguments and the extracted text is read from stdout.
    pub command: Vec<String>,
    /// Hard cap per invocation; the worker process is killed past it.
    pub timeout: Duration,
}

impl ScrapeConfig {
    pub fn new(command: Vec<String>) -> Self {
        Self { command, timeout: Duration::from_secs(100) }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

/// Runs each scrape as a child process, killed on timeout.
pub struct ProcessScraper {
    config: ScrapeConfig,
}

impl ProcessScraper {
    pub fn new(config: ScrapeConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl Scraper for ProcessScraper {
    async fn extract(&self, url: &str, kind: ResourceKind) -> Result<String> {
        let Some((program, args)) = self.config.command.split_first() else {
            return Err(SearchError::ScrapeFailed {
                url: url.to_string(),
                reason: "empty scraper command".to_string(),
            });
        };

        let child = Command::new(program)
            .args(args)
            .arg(kind.to_string())
            .arg(url)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::null())
            // Dropping the future past the timeout must take the worker
            // process down with it.
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| SearchError::ScrapeFailed {
                url: url.to_string(),
                reason: format!("spawn failed: {e}"),
            })?;

        let output = tokio::time::timeout(self.config.timeout, child.wait_with_output())
            .await
            .map_err(|_| SearchError::ScrapeTimeout { url: url.to_string() })?
            .map_err(|e| SearchError::ScrapeFailed {
                url: url.to_string(),
                reason: format!("worker I/O failed: {e}"),
            })?;

        if !output.status.success() {
            return Err(SearchError::ScrapeFailed {
                url: url.to_string(),
                reason: format!("worker exited with {}", output.status),
            });
        }

        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }
}

/// Scripted behavior for one URL in a [`MockScraper`].
#[derive(Debug, Clone)]
pub enum MockScrape {
    Body(String),
    /// Sleep this long before answering (for timeout tests).
    Hang(Duration),
    Fail(String),
}

/// Test scraper answering from a URL-keyed script.
pub struct MockScraper {
    script: HashMap<String, MockScrape>,
}

impl MockScraper {
    pub fn new(script: HashMap<String, MockScrape>) -> Self {
        Self { script }
    }
}

#[async_trait]
impl Scraper for MockScraper {
    async fn extract(&self, url: &str, _kind: ResourceKind) -> Result<String> {
        match self.script.get(url) {
            Some(MockScrape::Body(text)) => Ok(text.clone()),
            Some(MockScrape::Hang(delay)) => {
                tokio::time::sleep(*delay).await;
                Ok(String::new())
            }
            Some(MockScrape::Fail(reason)) => Err(SearchError::ScrapeFailed {
                url: url.to_string(),
                reason: reason.clone(),
            }),
            None => Err(SearchError::ScrapeFailed {
                url: url.to_string(),
                reason: "no scripted behavior".to_string(),
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn subprocess_scrape_captures_stdout() {
        let config = ScrapeConfig::new(vec!["/bin/sh".into(), "-c".into(), "echo body for $1".into(), "scraper".into()]);
        let scraper = ProcessScraper::new(config);
        let text = scraper.extract("https://x.example/p", ResourceKind::Html).await.unwrap();
        assert_eq!(text.trim(), "body for html");
    }

    #[tokio::test]
    async fn hanging_worker_is_killed_at_the_timeout() {
        let config = ScrapeConfig::new(vec!["/bin/sh".into(), "-c".into(), "sleep 30".into()])
            .with_timeout(Duration::from_millis(100));
        let scraper = ProcessScraper::new(config);
        let err = scraper.extract("https://slow.example", ResourceKind::Html).await.unwrap_err();
        assert!(matches!(err, SearchError::ScrapeTimeout { .. }));
    }

    #[tokio::test]
    async fn failing_worker_reports_its_status() {
        let config = ScrapeConfig::new(vec!["/bin/sh".into(), "-c".into(), "exit 3".into()]);
        let scraper = ProcessScraper::new(config);
        let err = scraper.extract("https://bad.example", ResourceKind::Pdf).await.unwrap_err();
        assert!(matches!(err, SearchError::ScrapeFailed { .. }));
    }
}
