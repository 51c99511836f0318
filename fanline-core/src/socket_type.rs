//! Socket kind enumeration.
//!
//! Four kinds are enough for the plane: one-to-many publish, prefix-filtered
//! subscribe, round-robin push and fair-queued pull.

use std::fmt;

/// Socket kinds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SocketType {
    /// PUB socket for publishing messages to subscribers; lossy when a
    /// bounded peer queue is full
    Pub,

    /// SUB socket receiving messages matching its prefix subscriptions
    Sub,

    /// PUSH socket for round-robin distribution to pullers
    Push,

    /// PULL socket fair-queuing messages from all connected pushers
    Pull,
}

impl SocketType {
    /// Get the socket kind as a string name.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Pub => "PUB",
            Self::Sub => "SUB",
            Self::Push => "PUSH",
            Self::Pull => "PULL",
        }
    }

    /// Whether `send` is defined for this kind.
    #[must_use]
    pub const fn can_send(&self) -> bool {
        matches!(self, Self::Pub | Self::Push)
    }

    /// Whether `recv` is defined for this kind.
    #[must_use]
    pub const fn can_recv(&self) -> bool {
        matches!(self, Self::Sub | Self::Pull)
    }

    /// Check if this socket kind is compatible with the given peer kind.
    #[must_use]
    pub const fn is_compatible(&self, peer: SocketType) -> bool {
        matches!(
            (self, peer),
            (Self::Pub, Self::Sub)
                | (Self::Sub, Self::Pub)
                | (Self::Push, Self::Pull)
                | (Self::Pull, Self::Push)
        )
    }
}

impl fmt::Display for SocketType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}
