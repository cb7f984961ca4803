//! Conversation turns and the caller-owned conversation.
//!
//! The survey page owns the history and resends it on every call, so a
//! [`Conversation`] here is a value: it is decoded from the request, a reply
//! is appended functionally, and the new value is sent back.

use serde::{Deserialize, Serialize};
use tracing::debug;

/// Placeholder content for an assistant turn when no reply text was found.
pub const FALLBACK_REPLY: &str = "(no reply)";

/// The role of a turn's author.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The survey participant
    User,
    /// The model
    Assistant,
    /// Instructions
    System,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::User => "user",
            Role::Assistant => "assistant",
            Role::System => "system",
        }
    }
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A single turn. Fields are private so a turn cannot change after creation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    role: Role,
    content: String,
}

impl ConversationTurn {
    pub fn new(role: Role, content: impl Into<String>) -> Self {
        Self {
            role,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self::new(Role::User, content)
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self::new(Role::Assistant, content)
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(Role::System, content)
    }

    pub fn role(&self) -> Role {
        self.role
    }

    pub fn content(&self) -> &str {
        &self.content
    }
}

/// An ordered, append-only sequence of turns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Conversation {
    turns: Vec<ConversationTurn>,
}

impl Conversation {
    pub fn new() -> Self {
        Self::default()
    }

    /// Decode the `conversation` field of an inbound request.
    ///
    /// Anything that is not an array yields an empty conversation. Entries
    /// that do not decode as a turn are skipped.
    pub fn from_json_lenient(value: Option<&serde_json::Value>) -> Self {
        let Some(items) = value.and_then(|v| v.as_array()) else {
            return Self::new();
        };

        let turns = items
            .iter()
            .enumerate()
            .filter_map(|(index, item)| {
                match serde_json::from_value::<ConversationTurn>(item.clone()) {
                    Ok(turn) => Some(turn),
                    Err(e) => {
                        debug!(index, error = %e, "Skipping malformed conversation entry");
                        None
                    }
                }
            })
            .collect();

        Self { turns }
    }

    pub fn turns(&self) -> &[ConversationTurn] {
        &self.turns
    }

    pub fn len(&self) -> usize {
        self.turns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }

    pub fn has_user_turn(&self) -> bool {
        self.turns.iter().any(|t| t.role == Role::User)
    }

    /// Return a new conversation with the assistant's reply appended.
    ///
    /// Empty or whitespace-only text is replaced by [`FALLBACK_REPLY`].
    /// `self` is left untouched.
    pub fn append_reply(&self, text: &str) -> Conversation {
        let mut turns = Vec::with_capacity(self.turns.len() + 1);
        turns.extend_from_slice(&self.turns);
        turns.push(ConversationTurn::assistant(reply_or_fallback(text)));
        Conversation { turns }
    }
}

impl FromIterator<ConversationTurn> for Conversation {
    fn from_iter<I: IntoIterator<Item = ConversationTurn>>(iter: I) -> Self {
        Self {
            turns: iter.into_iter().collect(),
        }
    }
}

/// The display text for a reply: the text itself, or the fallback literal.
pub fn reply_or_fallback(text: &str) -> &str {
    if text.trim().is_empty() {
        FALLBACK_REPLY
    } else {
        text
    }
}
