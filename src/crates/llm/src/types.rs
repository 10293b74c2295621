//! Chat message model shared by all client implementations.

use report_core::{AncestorMessage, Entity};
use serde::{Deserialize, Serialize};

/// Role of a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

/// One chat message as sent over the wire.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into() }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into() }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into() }
    }

    /// Map a DAG-level ancestor message onto a chat role.
    pub fn from_ancestor(msg: &AncestorMessage) -> Self {
        let role = match msg.entity {
            Entity::System => Role::System,
            Entity::User => Role::User,
            Entity::Llm => Role::Assistant,
        };
        Self { role, content: msg.text.clone() }
    }
}

/// A URL citation attached by the web-search variant.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub title: String,
    pub url: String,
}

/// Result of one chat completion.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChatOutcome {
    pub text: String,
    pub citations: Vec<Citation>,
}

impl ChatOutcome {
    pub fn text_only(text: impl Into<String>) -> Self {
        Self { text: text.into(), citations: Vec::new() }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ancestor_roles_map_to_chat_roles() {
        let system = Message::from_ancestor(&AncestorMessage::system("s"));
        let user = Message::from_ancestor(&AncestorMessage::user("u"));
        let llm = Message::from_ancestor(&AncestorMessage::llm("a"));
        assert_eq!(system.role, Role::System);
        assert_eq!(user.role, Role::User);
        assert_eq!(llm.role, Role::Assistant);
    }

    #[test]
    fn message_wire_shape() {
        let json = serde_json::to_value(Message::user("hi")).unwrap();
        assert_eq!(json["role"], "user");
        assert_eq!(json["content"], "hi");
    }
}
