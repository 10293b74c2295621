//! LLM-backed search query synthesis.

use std::sync::Arc;
use std::sync::OnceLock;

use llm::{LlmClient, Message};
use regex::Regex;
use serde::Deserialize;

use crate::error::{Result, SearchError};

/// Number of queries one synthesis round produces.
const QUERY_COUNT: usize = 6;

const SYNTHESIS_INSTRUCTIONS: &str = "You are a helpful assistant that generates web search prompts. \
The user has asked a complex question. You need to produce exactly six (6) distinct search queries \
that would help the user find relevant information. \
Two (and only two) of those search prompts must contain: filetype:pdf\n\n\
IMPORTANT: Return your answer as valid JSON with the following structure:\n\n\
{\n  \"search_prompts\": [\n    \"Prompt 1\",\n    \"Prompt 2\",\n    \"Prompt 3\",\n    \"Prompt 4\",\n    \"Prompt 5\",\n    \"Prompt 6\"\n  ]\n}\n\n\
No additional keys should be present. Only return the JSON formatted response.";

#[derive(Deserialize)]
struct SynthesisReply {
    #[serde(default)]
    search_prompts: Vec<String>,
}

/// Turns one composite prompt into a handful of diverse search queries.
pub struct QuerySynthesizer {
    client: Arc<dyn LlmClient>,
}

impl QuerySynthesizer {
    pub fn new(client: Arc<dyn LlmClient>) -> Self {
        Self { client }
    }

    /// Generate search queries for `incoming_prompt`. Never fails: on
    /// any synthesis or parse problem, stock variations of the prompt
    /// are returned instead.
    pub async fn generate_search_prompts(&self, incoming_prompt: &str) -> Vec<String> {
        match self.try_generate(incoming_prompt).await {
            Ok(prompts) if !prompts.is_empty() => prompts,
            Ok(_) => {
                tracing::warn!("query synthesis returned no prompts, using fallback queries");
                fallback_queries(incoming_prompt)
            }
            Err(e) => {
                tracing::warn!(error = %e, "query synthesis failed, using fallback queries");
                fallback_queries(incoming_prompt)
            }
        }
    }

    async fn try_generate(&self, incoming_prompt: &str) -> Result<Vec<String>> {
        let messages = vec![
            Message::system(SYNTHESIS_INSTRUCTIONS),
            Message::user(format!(
                "The user asked: '{incoming_prompt}'. Please propose six (6) different search queries."
            )),
        ];

        let outcome = self
            .client
            .chat(&messages, false)
            .await
            .map_err(|e| SearchError::SynthesisFailed(e.to_string()))?;

        let body = extract_json_block(&outcome.text);
        let reply: SynthesisReply = serde_json::from_str(body)
            .map_err(|e| SearchError::SynthesisFailed(format!("unparseable reply: {e}")))?;

        Ok(reply.search_prompts.iter().map(|p| capitalize(p)).collect())
    }
}

/// Six numbered variations of the input prompt, used whenever the LLM
/// cannot be asked or answers garbage.
fn fallback_queries(incoming_prompt: &str) -> Vec<String> {
    (1..=QUERY_COUNT).map(|i| format!("{incoming_prompt} (Query {i})")).collect()
}

/// Pull the JSON payload out of a reply that may wrap it in a fenced
/// ```json block.
fn extract_json_block(text: &str) -> &str {
    static FENCE: OnceLock<Regex> = OnceLock::new();
    let fence = FENCE.get_or_init(|| {
        Regex::new(r"```(?:json)?\s*([\s\S]*?)\s*```").expect("fence pattern compiles")
    });
    match fence.captures(text) {
        Some(caps) => caps.get(1).map(|m| m.as_str()).unwrap_or(text),
        None => text.trim(),
    }
}

fn capitalize(text: &str) -> String {
    let mut chars = text.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().collect::<String>() + chars.as_str(),
        None => String::new(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use llm::MockLlm;

    #[tokio::test]
    async fn parses_plain_json_reply() {
        let reply = r#"{"search_prompts": ["one", "two", "three", "four", "five", "six filetype:pdf"]}"#;
        let synth = QuerySynthesizer::new(Arc::new(MockLlm::with_response(reply)));
        let prompts = synth.generate_search_prompts("question").await;
        assert_eq!(prompts.len(), 6);
        assert_eq!(prompts[0], "One");
        assert_eq!(prompts[5], "Six filetype:pdf");
    }

    #[tokio::test]
    async fn parses_fenced_json_reply() {
        let reply = "Here you go:\n```json\n{\"search_prompts\": [\"alpha\", \"beta\"]}\n```";
        let synth = QuerySynthesizer::new(Arc::new(MockLlm::with_response(reply)));
        let prompts = synth.generate_search_prompts("question").await;
        assert_eq!(prompts, vec!["Alpha", "Beta"]);
    }

    #[tokio::test]
    async fn garbage_reply_falls_back_to_stock_queries() {
        let synth = QuerySynthesizer::new(Arc::new(MockLlm::with_response("not json at all")));
        let prompts = synth.generate_search_prompts("company financials").await;
        assert_eq!(prompts.len(), 6);
        assert_eq!(prompts[0], "company financials (Query 1)");
        assert_eq!(prompts[5], "company financials (Query 6)");
    }

    #[tokio::test]
    async fn llm_error_falls_back_to_stock_queries() {
        let mock = MockLlm::new();
        mock.push_error(llm::LlmError::Api { status: 500, message: "down".into() });
        let synth = QuerySynthesizer::new(Arc::new(mock));
        let prompts = synth.generate_search_prompts("topic").await;
        assert_eq!(prompts.len(), 6);
        assert!(prompts.iter().all(|p| p.starts_with("topic (Query ")));
    }

    #[tokio::test]
    async fn empty_prompt_list_falls_back() {
        let reply = r#"{"search_prompts": []}"#;
        let synth = QuerySynthesizer::new(Arc::new(MockLlm::with_response(reply)));
        let prompts = synth.generate_search_prompts("q").await;
        assert_eq!(prompts.len(), 6);
    }
}
