//! Core types for the client-side message log

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A locally generated identifier for a message the server has not yet confirmed.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TempId(String);

impl TempId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TempId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Message identifier.
///
/// Local and server identifiers live in separate variants, so a temporary id
/// can never compare equal to a server id even if the strings match.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageId {
    /// Optimistic id assigned on the client
    Local(TempId),
    /// Id confirmed by the backend
    Server(String),
}

impl MessageId {
    pub fn server(id: impl Into<String>) -> Self {
        Self::Server(id.into())
    }

    pub fn is_server(&self) -> bool {
        matches!(self, MessageId::Server(_))
    }

    pub fn as_temp(&self) -> Option<&TempId> {
        match self {
            MessageId::Local(t) => Some(t),
            MessageId::Server(_) => None,
        }
    }
}

impl fmt::Display for MessageId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageId::Local(t) => write!(f, "{}", t),
            MessageId::Server(s) => f.write_str(s),
        }
    }
}

/// Message author
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Assistant,
}

impl Sender {
    /// Get a human-readable label for this sender
    pub fn label(&self) -> &'static str {
        match self {
            Sender::User => "you",
            Sender::Assistant => "assistant",
        }
    }
}

/// A single entry of the message log
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: MessageId,
    pub sender: Sender,
    /// Accumulated text; partial while an assistant reply is streaming
    pub content: String,
    pub timestamp: DateTime<Utc>,
    /// True once no further mutation of `content` is expected
    pub finalized: bool,
}

impl Message {
    /// Create an optimistic user message. User messages have no streaming
    /// phase, so they are finalized from the start.
    pub fn user(temp_id: TempId, content: impl Into<String>) -> Self {
        Self {
            id: MessageId::Local(temp_id),
            sender: Sender::User,
            content: content.into(),
            timestamp: Utc::now(),
            finalized: true,
        }
    }

    /// Create an open assistant message holding the first streamed token
    pub fn assistant_streaming(temp_id: TempId, token: impl Into<String>) -> Self {
        Self {
            id: MessageId::Local(temp_id),
            sender: Sender::Assistant,
            content: token.into(),
            timestamp: Utc::now(),
            finalized: false,
        }
    }

    /// Whether the server has confirmed this message
    pub fn is_acknowledged(&self) -> bool {
        self.id.is_server()
    }

    /// Whether this is an assistant reply still receiving tokens
    pub fn is_streaming(&self) -> bool {
        self.sender == Sender::Assistant && !self.finalized
    }
}
