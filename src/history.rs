//! Conversation history
//!
//! An ordered sequence of user/assistant turns, capped at a fixed maximum
//! with FIFO eviction. The cap is applied on append and again when loading
//! persisted or wire data, so the invariant holds regardless of source.

use serde::{Deserialize, Serialize};

/// Speaker of a conversation turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

/// A single immutable conversation turn
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    /// Create a turn
    #[must_use]
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }
}

/// Bounded conversation history with FIFO truncation
#[derive(Debug, Clone)]
pub struct History {
    turns: Vec<ConversationTurn>,
    max: usize,
}

impl History {
    /// Create an empty history with the given cap
    #[must_use]
    pub const fn new(max: usize) -> Self {
        Self {
            turns: Vec::new(),
            max,
        }
    }

    /// Rebuild from previously persisted turns, re-applying the cap
    #[must_use]
    pub fn from_turns(turns: Vec<ConversationTurn>, max: usize) -> Self {
        let mut history = Self { turns, max };
        history.truncate();
        history
    }

    /// Append a turn, skipping empty content, then truncate to the cap
    ///
    /// Oldest entries are evicted first; relative order is preserved.
    pub fn push(&mut self, role: Role, content: &str) {
        let trimmed = content.trim();
        if trimmed.is_empty() {
            return;
        }
        self.turns.push(ConversationTurn::new(role, trimmed));
        self.truncate();
    }

    /// The retained turns, oldest first
    #[must_use]
    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    fn truncate(&mut self) {
        if self.turns.len() > self.max {
            let excess = self.turns.len() - self.max;
            self.turns.drain(..excess);
        }
    }
}

/// Filter loosely-typed wire history down to valid turns
///
/// The history field arrives as arbitrary JSON from an untrusted client.
/// Entries survive only with a `user`/`assistant` role and non-empty string
/// content; content is trimmed. Anything else is silently dropped rather
/// than rejected, so a single malformed entry never fails the request.
#[must_use]
pub fn sanitize_wire_history(raw: &[serde_json::Value]) -> Vec<ConversationTurn> {
    raw.iter()
        .filter_map(|entry| {
            let role = match entry.get("role").and_then(serde_json::Value::as_str) {
                Some("user") => Role::User,
                Some("assistant") => Role::Assistant,
                _ => return None,
            };
            let content = entry
                .get("content")
                .and_then(serde_json::Value::as_str)?
                .trim();
            if content.is_empty() {
                return None;
            }
            Some(ConversationTurn::new(role, content))
        })
        .collect()
}
