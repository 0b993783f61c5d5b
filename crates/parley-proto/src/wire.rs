//! JSON frames exchanged with the chat backend

use crate::error::Result;
use crate::types::TempId;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};

/// Frames received from the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum InboundEvent {
    /// The backend stored a user message and assigned it an id.
    ///
    /// `timestamp` is `None` when the backend sent no usable time; the
    /// ack itself still applies.
    MessageAck {
        temp_id: TempId,
        message_id: String,
        #[serde(default, deserialize_with = "lenient_timestamp")]
        timestamp: Option<DateTime<Utc>>,
    },
    /// One token of a streaming assistant reply
    LlmToken { token: String },
    /// The assistant reply is complete; `text` is authoritative
    LlmDone { message_id: String, text: String },
    /// A participant started or stopped typing
    TypingIndicator { user_id: String, is_typing: bool },
}

/// Frames sent to the backend
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum OutboundEvent {
    UserMessage { content: String, temp_id: TempId },
    TypingIndicator { is_typing: bool },
}

/// Discriminator of an inbound frame
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    MessageAck,
    LlmToken,
    LlmDone,
    TypingIndicator,
}

impl EventKind {
    /// The `type` tag used on the wire
    pub fn as_str(&self) -> &'static str {
        match self {
            EventKind::MessageAck => "message_ack",
            EventKind::LlmToken => "llm_token",
            EventKind::LlmDone => "llm_done",
            EventKind::TypingIndicator => "typing_indicator",
        }
    }
}

/// Receiver of inbound events.
///
/// Each inbound kind maps to exactly one method, so an implementor has one
/// handler per kind and cannot register a second.
pub trait InboundHandler {
    type Output;

    fn on_message_ack(
        &mut self,
        temp_id: TempId,
        message_id: String,
        timestamp: Option<DateTime<Utc>>,
    ) -> Self::Output;

    fn on_llm_token(&mut self, token: String) -> Self::Output;

    fn on_llm_done(&mut self, message_id: String, text: String) -> Self::Output;

    fn on_typing_indicator(&mut self, user_id: String, is_typing: bool) -> Self::Output;
}

/// Accept RFC 3339, or a naive ISO 8601 time taken as UTC
fn lenient_timestamp<'de, D>(
    deserializer: D,
) -> std::result::Result<Option<DateTime<Utc>>, D::Error>
where
    D: Deserializer<'de>,
{
    let Some(raw) = Option::<String>::deserialize(deserializer)? else {
        return Ok(None);
    };
    if let Ok(ts) = DateTime::parse_from_rfc3339(&raw) {
        return Ok(Some(ts.with_timezone(&Utc)));
    }
    Ok(NaiveDateTime::parse_from_str(&raw, "%Y-%m-%dT%H:%M:%S%.f")
        .ok()
        .map(|naive| naive.and_utc()))
}

impl InboundEvent {
    /// Decode a text frame
    pub fn decode(text: &str) -> Result<Self> {
        Ok(serde_json::from_str(text)?)
    }

    pub fn kind(&self) -> EventKind {
        match self {
            InboundEvent::MessageAck { .. } => EventKind::MessageAck,
            InboundEvent::LlmToken { .. } => EventKind::LlmToken,
            InboundEvent::LlmDone { .. } => EventKind::LlmDone,
            InboundEvent::TypingIndicator { .. } => EventKind::TypingIndicator,
        }
    }

    /// Route this event to the handler method for its kind
    pub fn dispatch<H: InboundHandler + ?Sized>(self, handler: &mut H) -> H::Output {
        match self {
            InboundEvent::MessageAck {
                temp_id,
                message_id,
                timestamp,
            } => handler.on_message_ack(temp_id, message_id, timestamp),
            InboundEvent::LlmToken { token } => handler.on_llm_token(token),
            InboundEvent::LlmDone { message_id, text } => handler.on_llm_done(message_id, text),
            InboundEvent::TypingIndicator { user_id, is_typing } => {
                handler.on_typing_indicator(user_id, is_typing)
            }
        }
    }
}

impl OutboundEvent {
    /// The `type` tag used on the wire
    pub fn name(&self) -> &'static str {
        match self {
            OutboundEvent::UserMessage { .. } => "user_message",
            OutboundEvent::TypingIndicator { .. } => "typing_indicator",
        }
    }

    /// Encode as a text frame
    pub fn encode(&self) -> Result<String> {
        Ok(serde_json::to_string(self)?)
    }
}
