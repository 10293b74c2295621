//! Core data model for report composition runs.
//!
//! This crate holds the pieces every other crate agrees on: the prompt
//! dependency graph ([`PromptGraph`]), the per-node state store with
//! subscriber streaming ([`ResultStore`]), and the shared record types
//! (messages, online resources, node results).

pub mod error;
pub mod graph;
pub mod messages;
pub mod store;
pub mod visualization;

pub use error::{GraphError, StoreError};
pub use graph::{DagLink, DagNode, DagStructure, Prompt, PromptGraph, PromptSetDoc};
pub use messages::{
    AncestorMessage, Entity, NodeResult, NodeState, NodeStatus, OnlineData, OnlineResource,
    ResourceKind, SectionResult,
};
pub use store::{ResultStore, Subscription};
