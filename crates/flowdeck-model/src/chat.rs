//! Chat history records.
//!
//! Chat entries are persisted in their own lane: each entry is written
//! immediately under its own key, and a separate index lists the ids that
//! exist. The index owns the lifecycle — a record whose id is not in the
//! index is considered gone.

use chrono::{Local, SecondsFormat};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Who authored a chat message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One message inside a chat entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

/// A stored chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatEntry {
    /// Stable identifier, also the storage key suffix.
    pub id: String,

    /// Display title.
    pub title: String,

    /// Messages in conversation order.
    pub messages: Vec<ChatMessage>,

    /// RFC3339 creation timestamp.
    pub created_at: String,

    /// RFC3339 timestamp of the last mutation.
    pub updated_at: String,
}

impl ChatEntry {
    /// Create an empty entry with a fresh id.
    pub fn new(title: impl Into<String>) -> Self {
        let now = Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
        Self {
            id: Self::create_id(),
            title: title.into(),
            messages: Vec::new(),
            created_at: now.clone(),
            updated_at: now,
        }
    }

    /// Generate a short unique id (first two uuid segments).
    pub fn create_id() -> String {
        Uuid::new_v4()
            .to_string()
            .split('-')
            .take(2)
            .collect::<Vec<&str>>()
            .join("-")
    }

    /// Append a message and bump the updated timestamp.
    pub fn push_message(&mut self, role: ChatRole, content: impl Into<String>) {
        self.messages.push(ChatMessage {
            role,
            content: content.into(),
        });
        self.updated_at = Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_create_id_is_short_and_unique() {
        let a = ChatEntry::create_id();
        let b = ChatEntry::create_id();
        assert_ne!(a, b);
        assert_eq!(a.split('-').count(), 2);
    }

    #[test]
    fn test_push_message() {
        let mut entry = ChatEntry::new("Pipeline help");
        entry.push_message(ChatRole::User, "How do I branch a pipeline?");
        entry.push_message(ChatRole::Assistant, "Use a fork step.");

        assert_eq!(entry.messages.len(), 2);
        assert_eq!(entry.messages[0].role, ChatRole::User);
    }

    #[test]
    fn test_entry_round_trip() {
        let mut entry = ChatEntry::new("Round trip");
        entry.push_message(ChatRole::User, "hello");

        let payload = serde_json::to_string(&entry).unwrap();
        let reparsed: ChatEntry = serde_json::from_str(&payload).unwrap();
        assert_eq!(entry, reparsed);
    }
}
