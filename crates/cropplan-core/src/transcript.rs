//! Chat transcript types
//!
//! These are shared by every front end and carry no UI framework types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A single entry in the prediction chat
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub content: String,
    pub sender: Sender,
    pub timestamp: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// Append-only, ordered list of chat messages for one session
#[derive(Debug, Clone, Default)]
pub struct Transcript {
    messages: Vec<ChatMessage>,
    last_id: i64,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_user(&mut self, content: impl Into<String>) -> &ChatMessage {
        self.push(Sender::User, content.into())
    }

    pub fn push_bot(&mut self, content: impl Into<String>) -> &ChatMessage {
        self.push(Sender::Bot, content.into())
    }

    fn push(&mut self, sender: Sender, content: String) -> &ChatMessage {
        let timestamp = Utc::now();
        // Ids come from the clock but must stay unique when two messages
        // land in the same millisecond.
        let id = timestamp.timestamp_millis().max(self.last_id + 1);
        self.last_id = id;

        self.messages.push(ChatMessage {
            id: id.to_string(),
            content,
            sender,
            timestamp,
        });
        &self.messages[self.messages.len() - 1]
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn last(&self) -> Option<&ChatMessage> {
        self.messages.last()
    }

    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }
}
