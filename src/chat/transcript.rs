//! Conversation turns and the transcript that orders them

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Assistant => "assistant",
        }
    }
}

/// One message, serialized in the completion API's `{role, content}` shape
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationTurn {
    pub role: Role,
    pub content: String,
}

impl ConversationTurn {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// Ordered turns of one session
///
/// Users and assistant alternate; the trailing assistant turn is the only one
/// ever rewritten, and only while its reply is being produced.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Transcript {
    turns: Vec<ConversationTurn>,
}

impl Transcript {
    pub fn new() -> Self {
        Self::default()
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

    pub fn last(&self) -> Option<&ConversationTurn> {
        self.turns.last()
    }

    pub fn push_user(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn::user(content));
    }

    pub fn push_assistant(&mut self, content: impl Into<String>) {
        self.turns.push(ConversationTurn::assistant(content));
    }

    /// Replace the trailing assistant turn's content, creating the turn if the
    /// transcript currently ends with a user turn
    pub fn set_reply(&mut self, content: impl Into<String>) {
        match self.turns.last_mut() {
            Some(turn) if turn.role == Role::Assistant => turn.content = content.into(),
            _ => self.push_assistant(content),
        }
    }

    /// Drop a trailing user turn that never got a reply
    pub fn drop_unanswered(&mut self) -> Option<ConversationTurn> {
        if self.turns.last().is_some_and(|t| t.role == Role::User) {
            self.turns.pop()
        } else {
            None
        }
    }

    /// True when every user turn is answered by exactly one assistant turn
    pub fn is_balanced(&self) -> bool {
        self.turns.len() % 2 == 0
            && self.turns.chunks(2).all(|pair| {
                pair[0].role == Role::User && pair[1].role == Role::Assistant
            })
    }

    pub fn clear(&mut self) {
        self.turns.clear();
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string_pretty(self)
    }
}

impl From<Vec<ConversationTurn>> for Transcript {
    fn from(turns: Vec<ConversationTurn>) -> Self {
        Self { turns }
    }
}
