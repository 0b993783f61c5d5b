//! Per-conversation chat session: composes the connection, the message log
//! and typing coordination behind one owner.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use parley_proto::{EventKind, InboundEvent, InboundHandler, Message, OutboundEvent, TempId};
use tokio::sync::watch;

use crate::{
    connection::{ConnectionManager, ConnectionStatus},
    error::Result,
    log::{LogChange, MessageLog},
    transport::{Connector, ReconnectPolicy},
    typing::TypingCoordinator,
};

/// Session configuration
#[derive(Debug, Clone)]
pub struct SessionConfig {
    /// Server base URL (`http(s)://` or `ws(s)://`)
    pub server_url: String,
    /// Our participant id, used to ignore echoes of our own typing frames
    pub participant_id: Option<String>,
    pub reconnect: ReconnectPolicy,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            server_url: "ws://localhost:8000".to_string(),
            participant_id: None,
            reconnect: ReconnectPolicy::default(),
        }
    }
}

/// Something the UI may want to redraw
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionUpdate {
    /// An inbound event was applied to the message log
    Log { kind: EventKind, change: LogChange },
    /// A remote typing frame arrived; carries the current remote flag
    Typing { remote_typing: bool },
    /// The connection changed state
    Status(ConnectionStatus),
}

/// One open conversation view.
///
/// All mutation happens through `&mut self` on the task that owns the session,
/// so inbound events and user actions are applied strictly one at a time.
pub struct ChatSession {
    conversation_id: String,
    connection: ConnectionManager,
    status_rx: watch::Receiver<ConnectionStatus>,
    log: MessageLog,
    typing: TypingCoordinator,
}

impl ChatSession {
    /// Create a session and start connecting to `conversation_id`
    pub fn connect(
        config: SessionConfig,
        connector: Arc<dyn Connector>,
        conversation_id: impl Into<String>,
    ) -> Result<Self> {
        let conversation_id = conversation_id.into();
        let mut connection =
            ConnectionManager::new(config.server_url, config.reconnect, connector);
        connection.connect(&conversation_id)?;
        let status_rx = connection.watch_status();

        Ok(Self {
            conversation_id,
            connection,
            status_rx,
            log: MessageLog::new(),
            typing: TypingCoordinator::new(config.participant_id),
        })
    }

    pub fn conversation_id(&self) -> &str {
        &self.conversation_id
    }

    /// Snapshot of the message log
    pub fn messages(&self) -> &[Message] {
        self.log.messages()
    }

    pub fn log(&self) -> &MessageLog {
        &self.log
    }

    pub fn status(&self) -> ConnectionStatus {
        self.connection.status()
    }

    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.connection.watch_status()
    }

    pub fn is_connected(&self) -> bool {
        self.connection.is_connected()
    }

    pub fn is_remote_typing(&self) -> bool {
        self.typing.is_remote_typing()
    }

    /// Whether to show a typing bubble: a remote participant is typing or
    /// the assistant is streaming a reply
    pub fn is_someone_typing(&self) -> bool {
        self.typing.is_remote_typing() || self.log.is_streaming()
    }

    /// Optimistically append a user message and send it.
    ///
    /// Returns `None` for blank input. The message stays in the log with its
    /// temporary id even if the channel is down.
    pub fn submit_user_message(&mut self, content: &str) -> Option<TempId> {
        let content = content.trim();
        if content.is_empty() {
            tracing::debug!("Ignoring blank message");
            return None;
        }

        let (temp_id, _) = self.log.submit_user_message(content);
        let sent = self.connection.send(&OutboundEvent::UserMessage {
            content: content.to_string(),
            temp_id: temp_id.clone(),
        });
        if !sent {
            tracing::info!(
                "Message {} kept locally; channel is {}",
                temp_id,
                self.connection.status()
            );
        }

        // The input box is empty after a send
        self.typing.notify_local_activity(false, &self.connection);
        Some(temp_id)
    }

    /// Report local input activity; see [`TypingCoordinator::notify_local_activity`]
    pub fn notify_local_activity(&mut self, has_content: bool) -> bool {
        self.typing.notify_local_activity(has_content, &self.connection)
    }

    /// Apply one inbound event
    pub fn apply(&mut self, event: InboundEvent) -> SessionUpdate {
        event.dispatch(self)
    }

    /// Wait for the next inbound event or status change and apply it.
    ///
    /// Returns `None` once the connection side has gone away entirely.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        tokio::select! {
            biased;

            // Status first, so typing state from a new link is not wiped by
            // a late notice of that link opening
            changed = self.status_rx.changed() => {
                changed.ok()?;
                let status = *self.status_rx.borrow_and_update();
                // Transitions may be coalesced, so an `Open` seen here can
                // follow a link loss that was never observed
                self.typing.clear_remote();
                self.typing.reset_local();
                Some(SessionUpdate::Status(status))
            }

            event = self.connection.recv() => event.map(|event| self.apply(event)),
        }
    }

    /// Close the channel deliberately
    pub fn disconnect(&mut self) {
        self.connection.disconnect();
    }

    /// Close the channel and wait for the socket to shut down
    pub async fn close(&mut self) {
        self.connection.shutdown().await;
    }
}

impl InboundHandler for ChatSession {
    type Output = SessionUpdate;

    fn on_message_ack(
        &mut self,
        temp_id: TempId,
        message_id: String,
        timestamp: Option<DateTime<Utc>>,
    ) -> SessionUpdate {
        SessionUpdate::Log {
            kind: EventKind::MessageAck,
            change: self.log.apply_ack(&temp_id, message_id, timestamp),
        }
    }

    fn on_llm_token(&mut self, token: String) -> SessionUpdate {
        SessionUpdate::Log {
            kind: EventKind::LlmToken,
            change: self.log.apply_token_chunk(&token),
        }
    }

    fn on_llm_done(&mut self, message_id: String, text: String) -> SessionUpdate {
        SessionUpdate::Log {
            kind: EventKind::LlmDone,
            change: self.log.apply_stream_done(message_id, text),
        }
    }

    fn on_typing_indicator(&mut self, user_id: String, is_typing: bool) -> SessionUpdate {
        self.typing.on_remote_typing_state(&user_id, is_typing);
        SessionUpdate::Typing {
            remote_typing: self.typing.is_remote_typing(),
        }
    }
}
