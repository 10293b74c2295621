//! Run engine for composed analytical reports.
//!
//! An [`Orchestrator`] owns one run of a prompt set against a focus:
//! it loads the [`PromptGraph`](report_core::PromptGraph), initializes
//! the [`ResultStore`](report_core::ResultStore), spawns one task per
//! node honoring dependencies, assembles ancestor chat histories,
//! invokes search and the LLM, and drives every node to a terminal
//! state. [`ReportAssembler`](assembler) turns a finished store into
//! Markdown, and [`RunRegistry`](registry) maps run ids to live runs
//! and persisted snapshots.

pub mod ancestry;
pub mod assembler;
pub mod config;
pub mod finance;
pub mod molder;
pub mod registry;
pub mod run;
pub mod stream;

pub use config::{Collaborators, OnlineDataSource, RunConfig, RunOptions};
pub use finance::{FinancialDataProvider, RemoteFinancialData, StaticFinancialData};
pub use registry::{RegistryConfig, RunRegistry};
pub use run::{Orchestrator, RunHandle};
pub use stream::StreamFrame;

use thiserror::Error;

/// Errors surfaced by the orchestration layer.
#[derive(Error, Debug)]
pub enum OrchestratorError {
    /// The prompt graph failed to load; no run is started.
    #[error("graph error: {0}")]
    Graph(#[from] report_core::GraphError),

    /// A result-store write was rejected.
    #[error("store error: {0}")]
    Store(#[from] report_core::StoreError),

    /// Search aggregation or endpoint discovery failed for a node.
    #[error("search error: {0}")]
    Search(#[from] websearch::SearchError),

    /// The LLM call for a node failed beyond recovery.
    #[error("LLM error: {0}")]
    Llm(#[from] llm::LlmError),

    /// The financial lookup failed.
    #[error("financial lookup failed: {0}")]
    Finance(String),

    /// At least one node ended `failed`; the rest of the run finished.
    #[error("{count} node(s) failed: {ids:?}", count = ids.len())]
    NodesFailed { ids: Vec<u32> },

    /// The run id is not registered.
    #[error("unknown run id {0}")]
    UnknownRun(String),

    /// No prompt-set document exists under that name.
    #[error("unknown prompt set '{0}'")]
    UnknownPromptSet(String),

    /// The run was restored from disk and cannot be re-executed.
    #[error("run was restored read-only and cannot be re-executed")]
    ReadOnlyRun,

    /// A persisted run document is missing or malformed.
    #[error("persisted run is invalid: {0}")]
    InvalidPersistedRun(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, OrchestratorError>;
