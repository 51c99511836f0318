/// Fanline kernel error types
///
/// Error handling for socket, transport and framing operations.
use std::io;
use thiserror::Error;

/// Main error type for kernel operations
#[derive(Error, Debug)]
pub enum SocketError {
    /// IO error during transport operations
    #[error("IO error: {0}")]
    Io(#[from] io::Error),

    /// Framing or message-shape violation
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Malformed or unsupported endpoint string
    #[error(transparent)]
    Endpoint(#[from] crate::endpoint::EndpointError),

    /// Socket closed; no further sends or receives are possible
    #[error("Socket closed")]
    Closed,

    /// Operation not defined for this socket kind
    #[error("Operation not supported on {0} socket")]
    Unsupported(&'static str),

    /// Send attempted with no connected peer able to take the message
    #[error("No connected peers")]
    NoPeers,
}

/// Result type alias for kernel operations
pub type Result<T> = std::result::Result<T, SocketError>;

impl SocketError {
    /// Create a protocol error with a message
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }

    /// Check if this error means the peer or socket is gone
    #[must_use]
    pub const fn is_connection_error(&self) -> bool {
        matches!(self, Self::Closed | Self::NoPeers)
    }
}
