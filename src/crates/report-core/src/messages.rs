//! Shared record types exchanged between the orchestrator and its
//! collaborators.
//!
//! These are the explicit shapes behind everything that used to be an
//! ad-hoc dictionary in earlier prototypes: ancestor chat messages,
//! online resources discovered by search, and per-node results.

use serde::{Deserialize, Serialize};

/// Who authored a message in an ancestor chat history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Entity {
    System,
    User,
    Llm,
}

/// One message of the chat history a node's LLM call receives.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AncestorMessage {
    pub entity: Entity,
    pub text: String,
}

impl AncestorMessage {
    pub fn system(text: impl Into<String>) -> Self {
        Self { entity: Entity::System, text: text.into() }
    }

    pub fn user(text: impl Into<String>) -> Self {
        Self { entity: Entity::User, text: text.into() }
    }

    pub fn llm(text: impl Into<String>) -> Self {
        Self { entity: Entity::Llm, text: text.into() }
    }
}

/// How a discovered resource is scraped.
///
/// Word-processor documents are routed to the PDF scraper upstream, so
/// only these two kinds survive into the data model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResourceKind {
    Html,
    Pdf,
}

impl std::fmt::Display for ResourceKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ResourceKind::Html => write!(f, "html"),
            ResourceKind::Pdf => write!(f, "pdf"),
        }
    }
}

/// A URL-identified document discovered by search, scraped and summarized.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineResource {
    pub url: String,
    pub display_url: String,
    pub title: String,
    pub snippet: String,
    pub scrapped_text: String,
    pub extension: ResourceKind,
}

/// The bundle of online resources handed to a node's LLM call.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct OnlineData {
    pub results: Vec<OnlineResource>,
}

impl OnlineData {
    pub fn is_empty(&self) -> bool {
        self.results.is_empty()
    }
}

/// The payload stored for a completed node.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionResult {
    pub llm_text: String,
    pub online_data: OnlineData,
    // Older persisted runs spelled this field "section_tile".
    #[serde(alias = "section_tile")]
    pub section_title: String,
}

/// Lifecycle status of a node within a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum NodeStatus {
    Pending,
    Processing,
    Complete,
    Failed,
}

impl NodeStatus {
    /// `complete` and `failed` admit no further transitions.
    pub fn is_terminal(self) -> bool {
        matches!(self, NodeStatus::Complete | NodeStatus::Failed)
    }
}

impl std::fmt::Display for NodeStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            NodeStatus::Pending => write!(f, "pending"),
            NodeStatus::Processing => write!(f, "processing"),
            NodeStatus::Complete => write!(f, "complete"),
            NodeStatus::Failed => write!(f, "failed"),
        }
    }
}

/// Result payload attached to a node state.
///
/// Consumers switch on [`NodeState::status`] before reading: `pending`
/// carries nothing, `processing` a human-readable message, `failed` an
/// error string and `complete` a full [`SectionResult`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum NodeResult {
    #[default]
    None,
    Message(String),
    Section(SectionResult),
}

impl NodeResult {
    /// The section payload, when this node completed.
    pub fn as_section(&self) -> Option<&SectionResult> {
        match self {
            NodeResult::Section(section) => Some(section),
            _ => None,
        }
    }

    /// The processing or failure message, when one is attached.
    pub fn as_message(&self) -> Option<&str> {
        match self {
            NodeResult::Message(msg) => Some(msg),
            _ => None,
        }
    }
}

/// Status plus payload for one node, as streamed to subscribers and
/// persisted in run snapshots.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeState {
    pub status: NodeStatus,
    pub result: NodeResult,
}

impl NodeState {
    pub fn pending() -> Self {
        Self { status: NodeStatus::Pending, result: NodeResult::None }
    }

    pub fn processing(msg: impl Into<String>) -> Self {
        Self { status: NodeStatus::Processing, result: NodeResult::Message(msg.into()) }
    }

    pub fn complete(section: SectionResult) -> Self {
        Self { status: NodeStatus::Complete, result: NodeResult::Section(section) }
    }

    pub fn failed(err: impl Into<String>) -> Self {
        Self { status: NodeStatus::Failed, result: NodeResult::Message(err.into()) }
    }
}
