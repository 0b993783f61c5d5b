//! parley-sync: Realtime sync engine for chat conversations
//!
//! This crate keeps a client-side message log consistent with the event
//! stream a chat backend pushes over a WebSocket, including optimistic user
//! messages, token-by-token assistant replies, typing state and reconnection.

pub mod connection;
pub mod error;
pub mod log;
pub mod session;
pub mod transport;
pub mod typing;

pub use connection::{ConnectionManager, ConnectionStatus};
pub use error::Error;
pub use log::{LogChange, MessageLog};
pub use session::{ChatSession, SessionConfig, SessionUpdate};
pub use transport::{Connector, ReconnectPolicy, WebSocketConnector, conversation_url};
pub use typing::TypingCoordinator;
