//! Resource-type detection.
//!
//! Order of preference: the URL's trailing extension, a HEAD request's
//! `Content-Type`, then a streaming GET peek. Word-processor documents
//! are routed to the PDF scraper; everything unrecognized is treated as
//! HTML.

use std::sync::OnceLock;

use regex::Regex;
use report_core::ResourceKind;

const WORD_CONTENT_TYPES: &[&str] = &[
    "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
    "application/msword",
];

/// Infer how to scrape `url`.
pub async fn detect_resource_kind(client: &reqwest::Client, url: &str) -> ResourceKind {
    match trailing_extension(url).as_deref() {
        Some("pdf") => return ResourceKind::Pdf,
        Some("doc") | Some("docx") => return ResourceKind::Pdf,
        // Server-rendered pages lie in their extension; probe them.
        Some("aspx") | None => {}
        Some(_) => return ResourceKind::Html,
    }
    probe_content_type(client, url).await
}

/// Extension at the end of the URL path, if any.
fn trailing_extension(url: &str) -> Option<String> {
    static EXT: OnceLock<Regex> = OnceLock::new();
    let ext = EXT.get_or_init(|| {
        Regex::new(r"\.([a-zA-Z0-9]+)([?&]|$)").expect("extension pattern compiles")
    });
    ext.captures(url).and_then(|c| c.get(1)).map(|m| m.as_str().to_lowercase())
}

async fn probe_content_type(client: &reqwest::Client, url: &str) -> ResourceKind {
    match client.head(url).send().await {
        Ok(response) => kind_from_content_type(&response),
        Err(e) => {
            tracing::warn!(url, error = %e, "HEAD request failed, falling back to GET peek");
            match client.get(url).send().await {
                // Only the headers are read; the body stream is dropped.
                Ok(response) => kind_from_content_type(&response),
                Err(e) => {
                    tracing::warn!(url, error = %e, "GET peek failed, assuming html");
                    ResourceKind::Html
                }
            }
        }
    }
}

fn kind_from_content_type(response: &reqwest::Response) -> ResourceKind {
    let content_type = response
        .headers()
        .get(reqwest::header::CONTENT_TYPE)
        .and_then(|v| v.to_str().ok())
        .unwrap_or("")
        .to_lowercase();

    if content_type.contains("application/pdf") {
        ResourceKind::Pdf
    } else if WORD_CONTENT_TYPES.iter().any(|t| content_type.contains(t)) {
        ResourceKind::Pdf
    } else {
        ResourceKind::Html
    }
}
