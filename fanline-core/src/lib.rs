//! Fanline Core
//!
//! This crate contains the thread-based socket kernel the pub/sub plane is
//! built on:
//! - Typed PUB/SUB/PUSH/PULL endpoints (`socket`)
//! - In-process rendezvous hubs with publisher-side prefix filtering (`hub`)
//! - Endpoint namespace shared through an explicit `Context` (`context`)
//! - TCP transport with length-prefixed framing (`tcp`, `codec`)
//! - Fair multi-socket readiness poll (`poll`)
//! - Blocking forwarding proxies (`proxy`)
//! - Error types (`error`)

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod codec;
pub mod context;
pub mod endpoint;
pub mod error;
pub mod hub;
pub mod message;
pub mod options;
pub mod poll;
pub mod proxy;
pub mod socket;
pub mod socket_type;

mod tcp;

// Small prelude so the plane crate can pull the common names in one line.
pub mod prelude {
    pub use crate::context::Context;
    pub use crate::endpoint::Endpoint;
    pub use crate::error::{Result, SocketError};
    pub use crate::message::Multipart;
    pub use crate::options::SocketOptions;
    pub use crate::poll::poll;
    pub use crate::proxy::{proxy, proxy_fanout};
    pub use crate::socket::Socket;
    pub use crate::socket_type::SocketType;
}
