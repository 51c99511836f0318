//! Fanline
//!
//! A publish/subscribe messaging plane for a fleet of document database
//! nodes and routers. Channels are byte-string topics routed by prefix;
//! subscribers retrieve messages by long-polling, optionally through a
//! document filter and field projection; idle subscriptions are reaped in
//! the background.
//!
//! The topology is role-aware: data nodes publish directly to their peers,
//! routers push into a relay cluster that republishes to everyone. Every
//! process runs a local relay forwarding its ingress traffic to an
//! in-process publish endpoint that client subscriptions attach to.
//!
//! ```no_run
//! use fanline::{PlaneOptions, PubSub};
//!
//! # fn main() -> fanline::Result<()> {
//! let plane = PubSub::new(PlaneOptions::default())?;
//!
//! let id = plane.subscribe("chat.", None, None)?;
//! plane.publish("chat.room1", &serde_json::Map::new())?;
//!
//! let reply = plane.poll(&[id], 2000)?;
//! for message in reply.into_ordered() {
//!     println!("{}: {:?}", message.channel, message.body);
//! }
//! # Ok(())
//! # }
//! ```

#![deny(unsafe_code)]
#![allow(clippy::module_name_repetitions)]

pub mod config;
pub mod document;
pub mod error;
pub mod id;
pub mod message;
pub mod plane;
pub mod wire;

mod registry;
mod topology;

pub use config::PlaneOptions;
pub use document::{Document, Matcher, Projection};
pub use error::{PubSubError, Result};
pub use id::SubscriptionId;
pub use message::SubscriptionMessage;
pub use plane::{PollReply, PubSub, Unsubscribed};
pub use topology::INT_PUBSUB_ENDPOINT;
