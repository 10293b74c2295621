//! Chat-completion clients.
//!
//! The orchestrator talks to a large-language model through the
//! [`LlmClient`] trait. [`RemoteLlmClient`] speaks an OpenAI-compatible
//! chat API, optionally with the web-search variant that returns URL
//! citations; [`MockLlm`] is the scriptable in-process stand-in used by
//! mock runs and tests.

pub mod config;
pub mod error;
pub mod mock;
pub mod remote;
pub mod types;

pub use config::RemoteLlmConfig;
pub use error::{LlmError, Result};
pub use mock::MockLlm;
pub use remote::RemoteLlmClient;
pub use types::{ChatOutcome, Citation, Message, Role};

use async_trait::async_trait;

/// A stateless chat-completion backend.
///
/// Clients are cheap to clone or re-instantiate per call; the
/// orchestrator holds one behind an `Arc`.
#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Run one chat completion. With `web_search` set, the backend may
    /// consult the web and attach URL citations to the outcome.
    async fn chat(&self, messages: &[Message], web_search: bool) -> Result<ChatOutcome>;
}
