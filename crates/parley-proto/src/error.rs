//! Error types for parley-proto

use thiserror::Error;

/// Result type alias using parley-proto Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur on the wire
#[derive(Error, Debug)]
pub enum Error {
    /// WebSocket handshake or framing failed
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// JSON serialization/deserialization failed
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// The channel address could not be built
    #[error("Invalid URL: {0}")]
    InvalidUrl(String),

    /// Transport-level failure not covered by the WebSocket layer
    #[error("Transport error: {0}")]
    Transport(String),

    /// The peer went away
    #[error("Channel closed")]
    ChannelClosed,
}

impl Error {
    /// Create a transport error from any displayable cause
    pub fn transport(message: impl Into<String>) -> Self {
        Self::Transport(message.into())
    }

    /// Whether this error came from a frame we could not decode rather than
    /// from the channel itself
    pub fn is_malformed_frame(&self) -> bool {
        matches!(self, Error::Json(_))
    }
}
