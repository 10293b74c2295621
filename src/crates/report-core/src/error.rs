//! Error types for graph loading and the result store.

use thiserror::Error;

/// Errors raised while loading or validating a prompt graph.
///
/// All three structural variants are fatal: a run is never started on a
/// graph that failed to load.
#[derive(Error, Debug)]
pub enum GraphError {
    /// A prompt entry is malformed (missing id, duplicate id, empty text).
    #[error("invalid prompt '{section}': {reason}")]
    InvalidPrompt { section: String, reason: String },

    /// The dependency edges contain a cycle.
    #[error("prompt dependencies contain a cycle through node {node}")]
    CycleDetected { node: u32 },

    /// An edge references a prompt id that does not exist.
    #[error("edge references unknown prompt id {node}")]
    DanglingEdge { node: u32 },

    /// A chain literal could not be parsed into integer ids.
    #[error("malformed dependency chain '{literal}'")]
    InvalidChain { literal: String },

    /// The prompt-set document is not valid YAML.
    #[error("prompt document parse error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// Errors raised by [`ResultStore`](crate::store::ResultStore) writes.
#[derive(Error, Debug, PartialEq, Eq)]
pub enum StoreError {
    /// The node id was never initialized in the store.
    #[error("unknown node id {0}")]
    UnknownNode(u32),

    /// The node already reached `complete` or `failed`; the write was rejected.
    #[error("node {0} is already in a terminal state")]
    AlreadyTerminal(u32),
}
