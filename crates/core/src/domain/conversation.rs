use serde::{Deserialize, Serialize};

use crate::domain::approval::ApprovalRequest;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::System => "system",
            Self::User => "user",
            Self::Assistant => "assistant",
            Self::Tool => "tool",
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Tool name for `Role::Tool` messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl Message {
    pub fn system(content: impl Into<String>) -> Self {
        Self { role: Role::System, content: content.into(), name: None }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self { role: Role::User, content: content.into(), name: None }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self { role: Role::Assistant, content: content.into(), name: None }
    }

    pub fn tool(name: impl Into<String>, content: impl Into<String>) -> Self {
        Self { role: Role::Tool, content: content.into(), name: Some(name.into()) }
    }

    pub fn is_system(&self) -> bool {
        self.role == Role::System
    }
}

/// Ordered message history of one operator session.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Conversation {
    pub session_id: Option<String>,
    pub messages: Vec<Message>,
    pub approval_context: Option<ApprovalRequest>,
}

impl Conversation {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self { session_id: Some(session_id.into()), ..Self::default() }
    }

    pub fn push(&mut self, message: Message) {
        self.messages.push(message);
    }

    pub fn last_user_message(&self) -> Option<&Message> {
        self.messages.iter().rev().find(|message| message.role == Role::User)
    }
}
