use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Title used when a conversation has no user text to derive one from.
pub const UNTITLED_CHAT: &str = "New chat";

const TITLE_MAX_CHARS: usize = 40;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Model,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Part {
    pub text: String,
}

/// One conversation turn. `id` is the creation time in Unix milliseconds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub role: Role,
    pub parts: Vec<Part>,
}

impl Message {
    pub fn new(role: Role, text: impl Into<String>) -> Self {
        Self {
            id: now_millis(),
            role,
            parts: vec![Part { text: text.into() }],
        }
    }

    /// Text of the first part, or "" for a message without parts.
    pub fn text(&self) -> &str {
        self.parts.first().map(|p| p.text.as_str()).unwrap_or("")
    }

    /// Replace the text of the first part, creating it if missing.
    pub fn set_text(&mut self, text: impl Into<String>) {
        match self.parts.first_mut() {
            Some(part) => part.text = text.into(),
            None => self.parts.push(Part { text: text.into() }),
        }
    }
}

/// A saved conversation. Owned by exactly one user; `timestamp` is the
/// creation time and does not move on later saves.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRecord {
    pub id: String,
    pub title: String,
    pub messages: Vec<Message>,
    pub timestamp: DateTime<Utc>,
}

impl ChatRecord {
    pub fn summary(&self) -> ChatSummary {
        ChatSummary {
            id: self.id.clone(),
            title: self.title.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Sidebar projection of a chat record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatSummary {
    pub id: String,
    pub title: String,
    pub timestamp: DateTime<Utc>,
}

/// Uids and chat ids end up in storage paths: 1-128 of `[A-Za-z0-9_-]`.
pub fn is_valid_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= 128
        && id
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_')
}

pub fn now_millis() -> i64 {
    Utc::now().timestamp_millis()
}

/// Title for a conversation: the first user message with whitespace
/// collapsed, cut to 40 characters.
pub fn derive_title(messages: &[Message]) -> String {
    let first = messages
        .iter()
        .filter(|m| m.role == Role::User)
        .map(|m| m.text().split_whitespace().collect::<Vec<_>>().join(" "))
        .find(|t| !t.is_empty());

    let Some(text) = first else {
        return UNTITLED_CHAT.to_string();
    };

    if text.chars().count() <= TITLE_MAX_CHARS {
        return text;
    }

    let mut cut: String = text.chars().take(TITLE_MAX_CHARS).collect();
    cut.truncate(cut.trim_end().len());
    cut.push('…');
    cut
}
