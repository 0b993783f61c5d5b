//! Transport abstraction for conversation channels

use std::{pin::Pin, time::Duration};

use async_trait::async_trait;
use futures::{Sink, SinkExt, Stream, StreamExt, future};
use tokio_tungstenite::{connect_async, tungstenite::Message as WsMessage};

use crate::error::Result;

/// Reconnection policy
#[derive(Debug, Clone)]
pub struct ReconnectPolicy {
    /// Maximum number of reconnect attempts after an unexpected closure
    pub max_attempts: u32,
    /// Delay unit; attempt `n` waits `n * base_delay`
    pub base_delay: Duration,
}

impl Default for ReconnectPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_secs(1),
        }
    }
}

impl ReconnectPolicy {
    /// Calculate the delay before a given attempt (1-indexed)
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        self.base_delay.saturating_mul(attempt)
    }
}

/// Outgoing half of a link; accepts text frames
pub type FrameSink = Pin<Box<dyn Sink<String, Error = parley_proto::Error> + Send>>;

/// Incoming half of a link; yields text frames until the peer goes away
pub type FrameStream = Pin<Box<dyn Stream<Item = parley_proto::Result<String>> + Send>>;

/// One open socket to the backend
pub struct Link {
    pub sink: FrameSink,
    pub stream: FrameStream,
}

/// Opens links to a channel address
#[async_trait]
pub trait Connector: Send + Sync {
    /// Open a new link. A failed handshake is reported as an error and is
    /// treated like an unexpected closure by the caller.
    async fn open(&self, url: &str) -> Result<Link>;
}

/// Connector backed by tokio-tungstenite
#[derive(Debug, Clone, Default)]
pub struct WebSocketConnector;

#[async_trait]
impl Connector for WebSocketConnector {
    async fn open(&self, url: &str) -> Result<Link> {
        let (socket, response) = connect_async(url)
            .await
            .map_err(parley_proto::Error::from)?;
        tracing::debug!("WebSocket handshake with {} returned {}", url, response.status());

        let (write, read) = socket.split();

        let sink = write
            .sink_map_err(parley_proto::Error::from)
            .with(|text: String| future::ready(Ok::<_, parley_proto::Error>(WsMessage::Text(text))));

        let stream = read.filter_map(|message| {
            future::ready(match message {
                Ok(WsMessage::Text(text)) => Some(Ok(text)),
                Ok(WsMessage::Binary(data)) => {
                    tracing::warn!("Dropping binary frame ({} bytes)", data.len());
                    None
                }
                Ok(WsMessage::Close(frame)) => {
                    tracing::debug!("Peer sent close frame: {:?}", frame);
                    None
                }
                // Ping/Pong are answered by tungstenite itself
                Ok(_) => None,
                Err(e) => Some(Err(parley_proto::Error::from(e))),
            })
        });

        Ok(Link {
            sink: Box::pin(sink),
            stream: Box::pin(stream),
        })
    }
}

/// Build the channel address for a conversation.
///
/// `base` may use `http`/`https` (mapped to `ws`/`wss`) or `ws`/`wss`.
pub fn conversation_url(base: &str, conversation_id: &str) -> parley_proto::Result<String> {
    let conversation_id = conversation_id.trim();
    if conversation_id.is_empty() {
        return Err(parley_proto::Error::InvalidUrl(
            "conversation id is empty".to_string(),
        ));
    }

    let base = base.trim().trim_end_matches('/');
    let base = if let Some(rest) = base.strip_prefix("https://") {
        format!("wss://{}", rest)
    } else if let Some(rest) = base.strip_prefix("http://") {
        format!("ws://{}", rest)
    } else if base.starts_with("ws://") || base.starts_with("wss://") {
        base.to_string()
    } else {
        return Err(parley_proto::Error::InvalidUrl(format!(
            "unsupported scheme in '{}'",
            base
        )));
    };

    Ok(format!(
        "{}/ws/chat/{}/",
        base,
        urlencoding::encode(conversation_id)
    ))
}
