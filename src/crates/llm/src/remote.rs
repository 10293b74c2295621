//! OpenAI-compatible chat client.

use reqwest::Client;
use serde::{Deserialize, Serialize};

use crate::config::RemoteLlmConfig;
use crate::error::{LlmError, Result};
use crate::types::{ChatOutcome, Citation, Message};
use crate::LlmClient;

use async_trait::async_trait;

/// HTTP client for an OpenAI-compatible `/chat/completions` endpoint.
#[derive(Clone)]
pub struct RemoteLlmClient {
    config: RemoteLlmConfig,
    client: Client,
}

impl RemoteLlmClient {
    pub fn new(config: RemoteLlmConfig) -> Result<Self> {
        let client = Client::builder().timeout(config.timeout).build()?;
        Ok(Self { config, client })
    }

    async fn request(&self, messages: &[Message], web_search: bool) -> Result<ChatOutcome> {
        let url = format!("{}/chat/completions", self.config.base_url);
        let body = ChatCompletionRequest {
            model: if web_search { &self.config.search_model } else { &self.config.model },
            messages,
            web_search_options: web_search.then(|| serde_json::json!({})),
            stream: false,
        };

        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.config.api_key))
            .json(&body)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::from_api(status, message));
        }

        let parsed: ChatCompletionResponse = response
            .json()
            .await
            .map_err(|e| LlmError::InvalidResponse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| LlmError::InvalidResponse("response carried no choices".into()))?;

        let citations = choice
            .message
            .annotations
            .unwrap_or_default()
            .into_iter()
            .filter(|a| a.kind == "url_citation")
            .filter_map(|a| a.url_citation)
            .map(|c| Citation {
                title: c.title.unwrap_or_else(|| "No Title".to_string()),
                url: c.url.unwrap_or_default(),
            })
            .filter(|c| !c.url.is_empty())
            .collect();

        Ok(ChatOutcome { text: choice.message.content.unwrap_or_default(), citations })
    }
}

#[async_trait]
impl LlmClient for RemoteLlmClient {
    async fn chat(&self, messages: &[Message], web_search: bool) -> Result<ChatOutcome> {
        if !web_search {
            return self.request(messages, false).await;
        }

        // The search variant is best-effort: on failure, fall back to a
        // plain completion without citations. Context-window overflows
        // still surface from the fallback call so callers can shrink.
        match self.request(messages, true).await {
            Ok(outcome) => Ok(outcome),
            Err(err) => {
                tracing::warn!(error = %err, "search-variant completion failed, retrying plain");
                self.request(messages, false).await
            }
        }
    }
}

#[derive(Serialize)]
struct ChatCompletionRequest<'a> {
    model: &'a str,
    messages: &'a [Message],
    #[serde(skip_serializing_if = "Option::is_none")]
    web_search_options: Option<serde_json::Value>,
    stream: bool,
}

#[derive(Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
    #[serde(default)]
    annotations: Option<Vec<Annotation>>,
}

#[derive(Deserialize)]
struct Annotation {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    url_citation: Option<UrlCitation>,
}

#[derive(Deserialize)]
struct UrlCitation {
    #[serde(default)]
    title: Option<String>,
    #[serde(default)]
    url: Option<String>,
}
