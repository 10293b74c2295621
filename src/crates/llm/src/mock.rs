//! In-process stand-in client for mock runs and tests.

use std::collections::VecDeque;

use parking_lot::Mutex;

use crate::error::{LlmError, Result};
use crate::types::{ChatOutcome, Citation, Message};
use crate::LlmClient;

use async_trait::async_trait;

/// Canned completion text returned by mock runs.
pub const MOCK_COMPLETION: &str = "Some llm response";

/// A client that answers from a canned response instead of calling out.
///
/// Errors can be scripted ahead of time; each scripted error is returned
/// once, in order, before the canned response resumes. Every call's
/// message list is recorded for inspection.
pub struct MockLlm {
    response: String,
    citations: Vec<Citation>,
    scripted_errors: Mutex<VecDeque<LlmError>>,
    calls: Mutex<Vec<Vec<Message>>>,
}

impl MockLlm {
    pub fn new() -> Self {
        Self::with_response(MOCK_COMPLETION)
    }

    pub fn with_response(text: impl Into<String>) -> Self {
        Self {
            response: text.into(),
            citations: Vec::new(),
            scripted_errors: Mutex::new(VecDeque::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_citations(mut self, citations: Vec<Citation>) -> Self {
        self.citations = citations;
        self
    }

    /// Queue an error to be returned by the next call.
    pub fn push_error(&self, err: LlmError) {
        self.scripted_errors.lock().push_back(err);
    }

    /// Message lists of every call made so far.
    pub fn calls(&self) -> Vec<Vec<Message>> {
        self.calls.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

impl Default for MockLlm {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl LlmClient for MockLlm {
    async fn chat(&self, messages: &[Message], _web_search: bool) -> Result<ChatOutcome> {
        self.calls.lock().push(messages.to_vec());
        if let Some(err) = self.scripted_errors.lock().pop_front() {
            return Err(err);
        }
        Ok(ChatOutcome { text: self.response.clone(), citations: self.citations.clone() })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn returns_canned_response_and_records_calls() {
        let mock = MockLlm::new();
        let outcome = mock.chat(&[Message::user("hello")], false).await.unwrap();
        assert_eq!(outcome.text, MOCK_COMPLETION);
        assert_eq!(mock.call_count(), 1);
        assert_eq!(mock.calls()[0][0].content, "hello");
    }

    #[tokio::test]
    async fn scripted_errors_come_first() {
        let mock = MockLlm::new();
        mock.push_error(LlmError::ContextTooLong("exceeds maximum".into()));

        let err = mock.chat(&[], false).await.unwrap_err();
        assert!(err.is_context_too_long());

        let outcome = mock.chat(&[], false).await.unwrap();
        assert_eq!(outcome.text, MOCK_COMPLETION);
    }
}
