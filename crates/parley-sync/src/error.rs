//! Error types for parley-sync

use thiserror::Error;

/// Result type alias using parley-sync Error
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while driving a chat session
#[derive(Error, Debug)]
pub enum Error {
    /// An error from the wire layer
    #[error(transparent)]
    Proto(#[from] parley_proto::Error),
}

impl Error {
    /// Whether the failed operation is worth retrying on a fresh connection
    pub fn is_transient(&self) -> bool {
        match self {
            Error::Proto(parley_proto::Error::InvalidUrl(_)) => false,
            Error::Proto(e) => !e.is_malformed_frame(),
        }
    }
}
