//! Role-aware socket construction.
//!
//! Data nodes publish directly to their peers' ingress sockets. Routers push
//! into the relay cluster, which republishes to every router and the other
//! relay peers. Every process also binds the in-process publish endpoint
//! that client subscriptions attach to, and a loopback ingress endpoint so a
//! node's own publishes travel the same path remote ones do.
//!
//! Fixed port offsets derive the wire endpoints from a process's configured
//! port: `+2345` for a republish/ingress feed, `+1234` for the relay pull
//! queue routers push into.

use std::sync::Arc;

use fanline_core::prelude::*;

use crate::config::PlaneOptions;
use crate::error::{PubSubError, Result};

/// The in-process endpoint client subscriptions connect to.
pub const INT_PUBSUB_ENDPOINT: &str = "inproc://pubsub";

/// Loopback endpoint tying a process's egress to its own ingress.
pub(crate) const INT_INGRESS_ENDPOINT: &str = "inproc://pubsub-ingress";

pub(crate) const RELAY_PUB_OFFSET: u16 = 2345;
pub(crate) const RELAY_PULL_OFFSET: u16 = 1234;

/// The sockets bootstrap produced for this process's role.
pub(crate) struct Topology {
    /// Where `publish` sends: PUB on data nodes, PUSH on routers and relays.
    pub egress: Socket,
    /// What the local relay thread reads: SUB everywhere except relay
    /// peers, which PULL router pushes.
    pub ingress: Arc<Socket>,
    /// The in-process publisher feeding client subscriptions.
    pub internal_pub: Arc<Socket>,
    /// Relay peers only: the external republish socket.
    pub external_pub: Option<Arc<Socket>>,
    /// Relay peers only: the feed following the rest of the cluster.
    pub relay_feed: Option<Arc<Socket>>,
}

fn host_port(entry: &str) -> Result<(&str, u16)> {
    let (host, port) = entry
        .rsplit_once(':')
        .ok_or_else(|| PubSubError::Bootstrap(format!("invalid peer address: {entry}")))?;
    if host.is_empty() {
        return Err(PubSubError::Bootstrap(format!(
            "invalid peer address: {entry}"
        )));
    }
    let port: u16 = port
        .parse()
        .map_err(|_| PubSubError::Bootstrap(format!("invalid peer port: {entry}")))?;
    Ok((host, port))
}

fn offset_port(port: u16, offset: u16, what: &str) -> Result<u16> {
    port.checked_add(offset)
        .ok_or_else(|| PubSubError::Bootstrap(format!("port out of range for {what}")))
}

pub(crate) fn bootstrap(ctx: &Context, opts: &PlaneOptions) -> Result<Topology> {
    // publishes to client subscribe sockets
    let internal_pub = Socket::new(ctx, SocketType::Pub);
    internal_pub.set_hwm(0);
    internal_pub.bind(INT_PUBSUB_ENDPOINT)?;

    // relay peers pull router pushes; everyone else subscribes to the world
    let ingress = if opts.is_relay {
        Socket::new(ctx, SocketType::Pull)
    } else {
        let socket = Socket::new(ctx, SocketType::Sub);
        socket.set_subscribe("")?;
        socket
    };
    ingress.set_hwm(0);
    ingress.bind(INT_INGRESS_ENDPOINT)?;

    // routers and relay peers push; data nodes publish
    let egress = if opts.is_router || opts.is_relay {
        Socket::new(ctx, SocketType::Push)
    } else {
        Socket::new(ctx, SocketType::Pub)
    };
    egress.set_hwm(0);

    let mut external_pub = None;
    let mut relay_feed = None;

    if opts.is_relay {
        // aggregate router pushes
        let pull_port = offset_port(opts.port, RELAY_PULL_OFFSET, "relay pull endpoint")?;
        ingress.bind(&format!("tcp://0.0.0.0:{pull_port}"))?;

        // republish to routers and the rest of the relay cluster
        let pub_port = offset_port(opts.port, RELAY_PUB_OFFSET, "relay publish endpoint")?;
        let external = Socket::new(ctx, SocketType::Pub);
        external.set_hwm(0);
        external.bind(&format!("tcp://0.0.0.0:{pub_port}"))?;
        external_pub = Some(Arc::new(external));

        // a relay is its own relay: local publishes enter its pull queue
        egress.connect(INT_INGRESS_ENDPOINT)?;

        // follow the other relay peers' republish feeds
        let feed = Socket::new(ctx, SocketType::Sub);
        feed.set_subscribe("")?;
        feed.set_hwm(0);
        let mut following = false;
        for entry in &opts.relay_peers {
            let (host, port) = host_port(entry)?;
            if port == opts.port {
                continue; // self
            }
            let peer_pub = offset_port(port, RELAY_PUB_OFFSET, entry)?;
            feed.connect(&format!("tcp://{host}:{peer_pub}"))?;
            following = true;
        }
        if following {
            relay_feed = Some(Arc::new(feed));
        }
    } else if opts.is_router {
        if opts.relay_peers.is_empty() {
            return Err(PubSubError::Bootstrap(
                "router topology requires relay peers".to_string(),
            ));
        }

        // receive the republish feed of every relay peer
        for entry in &opts.relay_peers {
            let (host, port) = host_port(entry)?;
            let peer_pub = offset_port(port, RELAY_PUB_OFFSET, entry)?;
            ingress.connect(&format!("tcp://{host}:{peer_pub}"))?;
        }

        // push to the relay peer with the highest port, ties by host
        let mut best: Option<(&str, u16)> = None;
        for entry in &opts.relay_peers {
            let (host, port) = host_port(entry)?;
            let better = match best {
                None => true,
                Some((best_host, best_port)) => {
                    port > best_port || (port == best_port && host > best_host)
                }
            };
            if better {
                best = Some((host, port));
            }
        }
        if let Some((host, port)) = best {
            let pull_port = offset_port(port, RELAY_PULL_OFFSET, "relay pull endpoint")?;
            egress.connect(&format!("tcp://{host}:{pull_port}"))?;
        }
    } else {
        // data node: loopback so local subscribers see local publishes
        egress.connect(INT_INGRESS_ENDPOINT)?;

        if !opts.peers.is_empty() {
            let ingress_port = offset_port(opts.port, RELAY_PUB_OFFSET, "peer ingress endpoint")?;
            ingress.bind(&format!("tcp://0.0.0.0:{ingress_port}"))?;

            for entry in &opts.peers {
                let (host, port) = host_port(entry)?;
                let peer_ingress = offset_port(port, RELAY_PUB_OFFSET, entry)?;
                egress.connect(&format!("tcp://{host}:{peer_ingress}"))?;
            }
        }
    }

    Ok(Topology {
        egress,
        ingress: Arc::new(ingress),
        internal_pub: Arc::new(internal_pub),
        external_pub,
        relay_feed,
    })
}
