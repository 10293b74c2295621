//! LLM refinement of a node's context into its section text.
//!
//! Takes the ancestor history plus the gathered online data, frames
//! them as a chat conversation, and calls the LLM. Context-window
//! overflows are handled by a bounded retry loop that halves the
//! longest scraped body each round; the shrink is a pure transform, so
//! retries always see a monotonically smaller corpus.

use llm::{ChatOutcome, Citation, LlmClient, Message};
use report_core::{AncestorMessage, OnlineData, OnlineResource, ResourceKind};
use websearch::engine::format_display_url;

use crate::Result;

/// Canned completion stored for system nodes.
pub const SYSTEM_PROMPT_COMPLETION: &str = "This is a system prompt";

const ONLINE_DATA_OPEN: &str = "##########\nONLINE_DATA\n----------\n";
const ONLINE_DATA_CLOSE: &str = "\n----------\nEnd of ONLINE_DATA\n##########\n";

/// Today's date as prose, e.g. `Thursday, March 27th, 2025`.
pub fn todays_date_string() -> String {
    let today = chrono::Local::now();
    let day = chrono::Datelike::day(&today);
    let suffix = match day {
        4..=20 | 24..=30 => "th",
        _ => ["st", "nd", "rd"][(day % 10) as usize - 1],
    };
    format!("{}{day}{suffix}{}", today.format("%A, %B "), today.format(", %Y"))
}

/// The standing instructions and focus framing prepended to every
/// node's conversation.
pub fn preamble(focus: &str) -> Vec<AncestorMessage> {
    let system = format!(
        "Today's Date: {}\n\
         You are an assistant with the responsibility of answering the user prompts. \
         The user sometimes will provide online data to answer these prompts in the \
         most up-to-date way. However, if no online data is provided, then you must \
         answer to the best of your knowledge at the time of your request. \
         Please provide your response in markdown style, with correct citation \
         of the online data sources. If the online data is empty, ignore it \
         and do not think of its existence. \
         Attempt to provide your most accurate response.\n\
         For every response, use markdown format, however, do not start your response \
         with a markdown header, but instead give a plain text intro when starting \
         your response. Do not re-state the question. The intro should start \
         answering right away. Follow the markdown format appropriately. \
         Your response should be an entire essay providing in-depth analysis. \
         Please provide long response",
        todays_date_string()
    );
    vec![
        AncestorMessage::system(system),
        AncestorMessage::user(format!(
            "The company we will be building the report on today is {focus}"
        )),
    ]
}

/// Result of one molding pass.
#[derive(Debug, Clone)]
pub struct MoldOutcome {
    pub llm_text: String,
    pub online_data: OnlineData,
}

/// Call the LLM over `history` + `online_data`, retrying on context
/// overflow with a halved corpus, up to `max_retries` shrink rounds.
pub async fn mold(
    client: &dyn LlmClient,
    focus: &str,
    history: &[AncestorMessage],
    online_data: &OnlineData,
    web_search: bool,
    use_search_variant: bool,
    max_retries: usize,
) -> Result<MoldOutcome> {
    let mut framed: Vec<AncestorMessage> = preamble(focus);
    framed.extend_from_slice(history);
    let base: Vec<Message> = framed.iter().map(Message::from_ancestor).collect();

    let mut online = online_data.clone();
    let mut attempt = 0;
    loop {
        let mut messages = base.clone();
        if !online.results.is_empty() {
            messages.push(online_data_message(&online));
        }
        if use_search_variant {
            messages = truncate_for_search_variant(messages);
        }

        match client.chat(&messages, web_search).await {
            Ok(outcome) => {
                let ChatOutcome { text, citations } = outcome;
                let online = prepend_citations(online, citations);
                return Ok(MoldOutcome { llm_text: text, online_data: online });
            }
            Err(e) if e.is_context_too_long() && attempt < max_retries => {
                match shrink_longest(&online) {
                    Some(smaller) => {
                        attempt += 1;
                        tracing::info!(attempt, "context overflow, halving the longest scraped body");
                        online = smaller;
                    }
                    None => return Err(e.into()),
                }
            }
            Err(e) => return Err(e.into()),
        }
    }
}

/// Frame the online data as the closing user message.
fn online_data_message(online: &OnlineData) -> Message {
    let body = serde_json::to_string_pretty(online).unwrap_or_default();
    Message::user(format!("{ONLINE_DATA_OPEN}{body}{ONLINE_DATA_CLOSE}"))
}

/// The search-preview variant only accepts a short history: keep the
/// first two messages and the last one.
fn truncate_for_search_variant(messages: Vec<Message>) -> Vec<Message> {
    if messages.len() <= 3 {
        return messages;
    }
    let last = messages.last().cloned();
    let mut kept: Vec<Message> = messages.into_iter().take(2).collect();
    kept.extend(last);
    kept
}

/// Produce a copy of `online` with its longest `scrapped_text` halved.
/// Returns `None` when nothing is left to shrink.
fn shrink_longest(online: &OnlineData) -> Option<OnlineData> {
    let (index, longest) = online
        .results
        .iter()
        .enumerate()
        .max_by_key(|(_, r)| r.scrapped_text.chars().count())?;
    let length = longest.scrapped_text.chars().count();
    if length == 0 {
        return None;
    }

    let mut shrunk = online.clone();
    let halved: String = longest.scrapped_text.chars().take(length / 2).collect();
    tracing::debug!(index, from = length, to = halved.chars().count(), "shrunk scraped body");
    shrunk.results[index].scrapped_text = halved;
    Some(shrunk)
}

/// Prepend LLM citations as reference entries, deduplicating by URL.
fn prepend_citations(online: OnlineData, citations: Vec<Citation>) -> OnlineData {
    if citations.is_empty() {
        return online;
    }

    let mut results: Vec<OnlineResource> = Vec::new();
    for citation in citations {
        let duplicate = online.results.iter().any(|r| r.url == citation.url)
            || results.iter().any(|r| r.url == citation.url);
        if duplicate {
            continue;
        }
        results.push(OnlineResource {
            display_url: format_display_url(&citation.url),
            url: citation.url,
            title: citation.title,
            snippet: String::new(),
            scrapped_text: String::new(),
            extension: ResourceKind::Html,
        });
    }
    results.extend(online.results);
    OnlineData { results }
}
