//! Connection lifecycle: connect, send, disconnect and bounded reconnection

use std::fmt;
use std::sync::Arc;

use futures::{SinkExt, StreamExt};
use parley_proto::{InboundEvent, OutboundEvent};
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::{
    error::Result,
    transport::{Connector, Link, ReconnectPolicy, conversation_url},
};

/// Lifecycle state of the conversation channel
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionStatus {
    /// Nothing has been connected yet
    Idle,
    /// A handshake is in flight
    Connecting,
    /// Frames can be sent
    Open,
    /// A deliberate close is in progress
    Closing,
    /// Closed deliberately; no reconnection will happen
    Closed,
    /// Waiting to retry after an unexpected closure
    Reconnecting { attempt: u32 },
    /// Gave up after exhausting reconnect attempts
    Disconnected,
}

impl ConnectionStatus {
    pub fn is_open(&self) -> bool {
        matches!(self, ConnectionStatus::Open)
    }

    /// Whether a connection task is (or is about to be) working on the channel
    pub fn is_live(&self) -> bool {
        matches!(
            self,
            ConnectionStatus::Connecting
                | ConnectionStatus::Open
                | ConnectionStatus::Reconnecting { .. }
        )
    }

    /// Whether no further transitions will happen without a new `connect`
    pub fn is_terminal(&self) -> bool {
        matches!(self, ConnectionStatus::Closed | ConnectionStatus::Disconnected)
    }
}

impl fmt::Display for ConnectionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ConnectionStatus::Idle => f.write_str("idle"),
            ConnectionStatus::Connecting => f.write_str("connecting"),
            ConnectionStatus::Open => f.write_str("open"),
            ConnectionStatus::Closing => f.write_str("closing"),
            ConnectionStatus::Closed => f.write_str("closed"),
            ConnectionStatus::Reconnecting { attempt } => {
                write!(f, "reconnecting (attempt {})", attempt)
            }
            ConnectionStatus::Disconnected => f.write_str("disconnected"),
        }
    }
}

/// Inbound event tagged with the generation of the connection that read it
type Tagged = (u64, InboundEvent);

/// One `connect` call's worth of state. Replaced, never mutated, on the next
/// `connect`.
struct Connection {
    conversation_id: String,
    outbound: mpsc::UnboundedSender<String>,
    /// Cancels the socket pump and any pending reconnect timer
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

/// Owns the duplex channel for one conversation view.
///
/// Inbound events are decoded on a background task and delivered, in receipt
/// order, through [`ConnectionManager::recv`]. Only events read by the current
/// connection are delivered.
pub struct ConnectionManager {
    base_url: String,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    status: Arc<watch::Sender<ConnectionStatus>>,
    inbound_tx: mpsc::UnboundedSender<Tagged>,
    inbound_rx: mpsc::UnboundedReceiver<Tagged>,
    /// Bumped on every `connect` and `disconnect`
    generation: u64,
    connection: Option<Connection>,
    closing: Option<JoinHandle<()>>,
}

impl ConnectionManager {
    /// Create a manager for the given server base URL
    pub fn new(
        base_url: impl Into<String>,
        policy: ReconnectPolicy,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let (status, _) = watch::channel(ConnectionStatus::Idle);
        let (inbound_tx, inbound_rx) = mpsc::unbounded_channel();
        Self {
            base_url: base_url.into(),
            policy,
            connector,
            status: Arc::new(status),
            inbound_tx,
            inbound_rx,
            generation: 0,
            connection: None,
            closing: None,
        }
    }

    /// Current status
    pub fn status(&self) -> ConnectionStatus {
        *self.status.borrow()
    }

    /// Subscribe to status transitions
    pub fn watch_status(&self) -> watch::Receiver<ConnectionStatus> {
        self.status.subscribe()
    }

    pub fn is_connected(&self) -> bool {
        self.status().is_open()
    }

    /// Next inbound event from the current connection.
    ///
    /// Events still queued from a replaced or closed connection are dropped.
    /// Cancel safe.
    pub async fn recv(&mut self) -> Option<InboundEvent> {
        loop {
            let (generation, event) = self.inbound_rx.recv().await?;
            if generation == self.generation {
                return Some(event);
            }
            tracing::debug!(
                "Dropping {} from a previous connection",
                event.kind().as_str()
            );
        }
    }

    /// Conversation of the current connection, if any
    pub fn conversation_id(&self) -> Option<&str> {
        self.connection.as_ref().map(|c| c.conversation_id.as_str())
    }

    /// Open a channel to `conversation_id`, replacing any existing one.
    ///
    /// Calling this again for the conversation that is already live is a
    /// no-op. Must be called from within a tokio runtime.
    pub fn connect(&mut self, conversation_id: &str) -> Result<()> {
        let already_live = self
            .connection
            .as_ref()
            .is_some_and(|c| c.conversation_id == conversation_id)
            && self.status().is_live();
        if already_live {
            tracing::debug!("Already connected to conversation {}", conversation_id);
            return Ok(());
        }

        let url = conversation_url(&self.base_url, conversation_id)?;

        if let Some(previous) = self.connection.take() {
            tracing::info!(
                "Replacing connection to conversation {}",
                previous.conversation_id
            );
            previous.cancel.cancel();
        }

        self.generation += 1;
        let cancel = CancellationToken::new();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        self.status.send_replace(ConnectionStatus::Connecting);

        let supervisor = Supervisor {
            url,
            policy: self.policy.clone(),
            connector: Arc::clone(&self.connector),
            status: StatusPublisher {
                tx: Arc::clone(&self.status),
                cancel: cancel.clone(),
            },
            generation: self.generation,
            inbound: self.inbound_tx.clone(),
            outbound: outbound_rx,
            cancel: cancel.clone(),
        };
        let task = tokio::spawn(supervisor.run());

        self.connection = Some(Connection {
            conversation_id: conversation_id.to_string(),
            outbound,
            cancel,
            task,
        });
        Ok(())
    }

    /// Send an event if the channel is open.
    ///
    /// Returns `false` when the event was dropped. Nothing is queued for a
    /// later connection.
    pub fn send(&self, event: &OutboundEvent) -> bool {
        let status = self.status();
        let Some(conn) = self.connection.as_ref().filter(|_| status.is_open()) else {
            tracing::debug!("Dropping {} while {}", event.name(), status);
            return false;
        };

        let frame = match event.encode() {
            Ok(frame) => frame,
            Err(e) => {
                tracing::warn!("Failed to encode {}: {}", event.name(), e);
                return false;
            }
        };

        conn.outbound.send(frame).is_ok()
    }

    /// Close the channel deliberately.
    ///
    /// Cancels any pending reconnect synchronously; no `Connecting` transition
    /// can follow.
    pub fn disconnect(&mut self) {
        let Some(conn) = self.connection.take() else {
            return;
        };

        self.status.send_replace(ConnectionStatus::Closing);
        self.generation += 1;
        conn.cancel.cancel();
        self.status.send_replace(ConnectionStatus::Closed);
        tracing::info!("Disconnected from conversation {}", conn.conversation_id);

        self.closing = Some(conn.task);
    }

    /// Disconnect and wait for the socket to finish closing
    pub async fn shutdown(&mut self) {
        self.disconnect();
        if let Some(task) = self.closing.take() {
            if let Err(e) = task.await {
                tracing::warn!("Connection task ended abnormally: {}", e);
            }
        }
    }
}

impl Drop for ConnectionManager {
    fn drop(&mut self) {
        if let Some(conn) = &self.connection {
            conn.cancel.cancel();
        }
    }
}

/// Status writer owned by a connection task.
///
/// Writes are refused once the task's token is cancelled, so a stale task can
/// never overwrite the status of a deliberate close or a newer connection.
struct StatusPublisher {
    tx: Arc<watch::Sender<ConnectionStatus>>,
    cancel: CancellationToken,
}

impl StatusPublisher {
    fn set(&self, status: ConnectionStatus) {
        let changed = self.tx.send_if_modified(|current| {
            if self.cancel.is_cancelled() || *current == status {
                return false;
            }
            *current = status;
            true
        });
        if changed {
            tracing::debug!("Connection status: {}", status);
        }
    }
}

enum LinkEnd {
    /// Deliberate close or replacement
    Cancelled,
    /// Nobody is consuming inbound events anymore
    ReceiverGone,
    /// Unexpected closure
    Dropped(String),
}

/// Background task driving one connection: handshake, pump, reconnect.
struct Supervisor {
    url: String,
    policy: ReconnectPolicy,
    connector: Arc<dyn Connector>,
    status: StatusPublisher,
    generation: u64,
    inbound: mpsc::UnboundedSender<Tagged>,
    outbound: mpsc::UnboundedReceiver<String>,
    cancel: CancellationToken,
}

impl Supervisor {
    async fn run(mut self) {
        let mut attempt = 0u32;

        loop {
            self.status.set(ConnectionStatus::Connecting);

            let opened = tokio::select! {
                _ = self.cancel.cancelled() => return,
                result = self.connector.open(&self.url) => result,
            };

            match opened {
                Ok(link) => {
                    attempt = 0;
                    self.status.set(ConnectionStatus::Open);
                    tracing::info!("Connected to {}", self.url);

                    let end = pump(
                        link,
                        &self.cancel,
                        &self.inbound,
                        &mut self.outbound,
                        self.generation,
                    )
                    .await;
                    match end {
                        LinkEnd::Cancelled => return,
                        LinkEnd::ReceiverGone => {
                            tracing::debug!("Inbound receiver dropped, closing {}", self.url);
                            self.status.set(ConnectionStatus::Closed);
                            return;
                        }
                        LinkEnd::Dropped(reason) => {
                            tracing::warn!("Connection to {} lost: {}", self.url, reason);
                        }
                    }
                }
                Err(e) if !e.is_transient() => {
                    tracing::error!("Cannot connect to {}: {}", self.url, e);
                    self.status.set(ConnectionStatus::Disconnected);
                    return;
                }
                Err(e) => {
                    tracing::warn!("Failed to connect to {}: {}", self.url, e);
                }
            }

            if attempt >= self.policy.max_attempts {
                tracing::error!(
                    "Max reconnect attempts ({}) reached, giving up on {}",
                    self.policy.max_attempts,
                    self.url
                );
                self.status.set(ConnectionStatus::Disconnected);
                return;
            }

            attempt += 1;
            let delay = self.policy.delay_for_attempt(attempt);
            self.status.set(ConnectionStatus::Reconnecting { attempt });
            self.discard_pending();
            tracing::warn!(
                "Reconnecting in {}ms (attempt {}/{})",
                delay.as_millis(),
                attempt,
                self.policy.max_attempts
            );

            tokio::select! {
                _ = self.cancel.cancelled() => return,
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }

    /// Frames accepted while the previous link was dying are not replayed
    fn discard_pending(&mut self) {
        let mut dropped = 0usize;
        while self.outbound.try_recv().is_ok() {
            dropped += 1;
        }
        if dropped > 0 {
            tracing::debug!("Discarded {} unsent frame(s)", dropped);
        }
    }
}

/// Move frames in both directions until the link ends
async fn pump(
    link: Link,
    cancel: &CancellationToken,
    inbound: &mpsc::UnboundedSender<Tagged>,
    outbound: &mut mpsc::UnboundedReceiver<String>,
    generation: u64,
) -> LinkEnd {
    let Link {
        mut sink,
        mut stream,
    } = link;

    loop {
        tokio::select! {
            biased;

            _ = cancel.cancelled() => {
                if let Err(e) = sink.close().await {
                    tracing::debug!("Error while closing link: {}", e);
                }
                return LinkEnd::Cancelled;
            }

            frame = stream.next() => match frame {
                Some(Ok(text)) => match InboundEvent::decode(&text) {
                    Ok(event) => {
                        if inbound.send((generation, event)).is_err() {
                            return LinkEnd::ReceiverGone;
                        }
                    }
                    Err(e) => {
                        tracing::warn!("Dropping malformed frame: {} ({:.120})", e, text);
                    }
                },
                Some(Err(e)) => return LinkEnd::Dropped(e.to_string()),
                None => return LinkEnd::Dropped("closed by peer".to_string()),
            },

            Some(frame) = outbound.recv() => {
                if let Err(e) = sink.send(frame).await {
                    return LinkEnd::Dropped(e.to_string());
                }
            }
        }
    }
}
