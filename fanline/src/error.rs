/// Plane error types
///
/// Per-subscription failures inside a call surface through the call's error
/// map keyed by subscription id; these are the errors for the call itself.
use thiserror::Error;

use crate::id::SubscriptionId;
use fanline_core::error::SocketError;

/// Main error type for plane operations
#[derive(Error, Debug)]
pub enum PubSubError {
    /// The kill switch is off; every API call short-circuits
    #[error("pubsub is disabled")]
    Disabled,

    /// The id is not (or no longer) in the registry
    #[error("Subscription not found.")]
    NotFound(SubscriptionId),

    /// Malformed frame sequence
    #[error("Protocol error: {0}")]
    Protocol(String),

    /// Failure in the socket kernel
    #[error(transparent)]
    Socket(#[from] SocketError),

    /// Message body was not a valid document
    #[error("invalid document body: {0}")]
    Document(#[from] serde_json::Error),

    /// Socket creation or bind failure during startup; the kill switches
    /// are flipped off permanently
    #[error("bootstrap failed: {0}")]
    Bootstrap(String),
}

/// Result type alias for plane operations
pub type Result<T> = std::result::Result<T, PubSubError>;

impl PubSubError {
    /// Create a protocol error with a message
    pub fn protocol(msg: impl Into<String>) -> Self {
        Self::Protocol(msg.into())
    }
}
