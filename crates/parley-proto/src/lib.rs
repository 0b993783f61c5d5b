//! parley-proto: Wire protocol and message model
//!
//! This crate defines the JSON frames exchanged with the chat backend over a
//! duplex channel, and the client-side message model those frames update.

pub mod error;
pub mod types;
pub mod wire;

pub use error::{Error, Result};
pub use types::*;
pub use wire::{EventKind, InboundEvent, InboundHandler, OutboundEvent};
