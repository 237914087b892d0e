//! Chat and message records shared by the server and the client engine

use serde::{Deserialize, Serialize};
use std::fmt;

/// Chat identifier (client-generated UUID v4)
pub type ChatId = String;

/// Opaque owner identifier supplied by the identity provider
pub type OwnerId = String;

/// Name given to chats created without one
pub const DEFAULT_CHAT_NAME: &str = "New Chat";

/// Milliseconds since the Unix epoch
pub fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

/// Generate a fresh chat id
pub fn new_chat_id() -> ChatId {
    uuid::Uuid::new_v4().to_string()
}

/// Author of a message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(Role::User),
            "assistant" => Some(Role::Assistant),
            _ => None,
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One turn of a conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: String,
    /// Epoch milliseconds
    pub timestamp: i64,
}

impl Message {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
            timestamp: now_millis(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }
}

/// A named, owned conversation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Chat {
    pub id: ChatId,
    pub owner_id: OwnerId,
    pub name: String,
    #[serde(default)]
    pub messages: Vec<Message>,
    pub created_at: i64,
    pub updated_at: i64,
    /// Incremented by every durable mutation; `save` is rejected when stale
    #[serde(default)]
    pub version: i64,
}

impl Chat {
    /// A new, empty chat owned by `owner_id`
    pub fn new(id: impl Into<ChatId>, owner_id: impl Into<OwnerId>, name: impl Into<String>) -> Self {
        let now = now_millis();
        Self {
            id: id.into(),
            owner_id: owner_id.into(),
            name: name.into(),
            messages: Vec::new(),
            created_at: now,
            updated_at: now,
            version: 0,
        }
    }

    pub fn last_message(&self) -> Option<&Message> {
        self.messages.last()
    }
}
