//! Role topology tests over real TCP on loopback.
//!
//! Links come up on background connector threads, so publishes are retried
//! until one makes it through the fabric.

use fanline::{Document, PlaneOptions, PubSub, SubscriptionId};
use serde_json::json;
use std::time::{Duration, Instant};

fn doc(v: serde_json::Value) -> Document {
    v.as_object().expect("test document must be an object").clone()
}

/// Run with RUST_LOG=debug to watch links come up.
fn init_logs() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

/// Pick a base port whose derived relay endpoints are also free.
fn pick_base_port() -> u16 {
    loop {
        let port = portpicker::pick_unused_port().expect("no free TCP port available");
        if port >= 60_000 {
            continue; // keep room for the fixed offsets
        }
        if portpicker::is_free_tcp(port + 2345) && portpicker::is_free_tcp(port + 1234) {
            return port;
        }
    }
}

/// Publish on `from` until `on` receives it, tolerating link start-up.
fn publish_until_delivered(
    from: &PubSub,
    on: &PubSub,
    id: SubscriptionId,
    channel: &str,
    body: &Document,
) -> fanline::SubscriptionMessage {
    let deadline = Instant::now() + Duration::from_secs(10);
    loop {
        from.publish(channel, body).unwrap();
        let reply = on.poll(&[id], 500).unwrap();
        assert!(
            reply.errors.is_empty(),
            "unexpected errors: {:?}",
            reply.errors
        );
        if let Some(message) = reply.into_ordered().into_iter().next() {
            return message;
        }
        assert!(
            Instant::now() < deadline,
            "message never arrived through the topology"
        );
    }
}

#[test]
fn router_round_trips_through_the_relay() {
    init_logs();
    let relay_port = pick_base_port();
    let relay_addr = format!("127.0.0.1:{relay_port}");

    let relay = PubSub::new(
        PlaneOptions::default()
            .with_relay(true)
            .with_port(relay_port)
            .with_relay_peers(vec![relay_addr.clone()]),
    )
    .unwrap();

    let router = PubSub::new(
        PlaneOptions::default()
            .with_router(true)
            .with_relay_peers(vec![relay_addr]),
    )
    .unwrap();

    // a router's own publishes come back to it through the relay
    let id = router.subscribe("fleet.", None, None).unwrap();
    let body = doc(json!({"op": "moveChunk", "n": 1}));
    let message = publish_until_delivered(&router, &router, id, "fleet.events", &body);

    assert_eq!(message.channel, "fleet.events");
    assert_eq!(message.body, body);

    router.shutdown();
    relay.shutdown();
}

#[test]
fn relay_peer_delivers_locally_through_its_own_queue() {
    init_logs();
    let relay_port = pick_base_port();

    let relay = PubSub::new(
        PlaneOptions::default()
            .with_relay(true)
            .with_port(relay_port)
            .with_relay_peers(vec![format!("127.0.0.1:{relay_port}")]),
    )
    .unwrap();

    let id = relay.subscribe("cfg.", None, None).unwrap();
    let body = doc(json!({"k": "v"}));
    let message = publish_until_delivered(&relay, &relay, id, "cfg.changed", &body);
    assert_eq!(message.body, body);

    relay.shutdown();
}

#[test]
fn data_nodes_exchange_publishes_over_tcp() {
    init_logs();
    let port_a = pick_base_port();
    let port_b = loop {
        let port = pick_base_port();
        if port != port_a {
            break port;
        }
    };

    let node_a = PubSub::new(
        PlaneOptions::default()
            .with_port(port_a)
            .with_peers(vec![format!("127.0.0.1:{port_b}")]),
    )
    .unwrap();

    let node_b = PubSub::new(
        PlaneOptions::default()
            .with_port(port_b)
            .with_peers(vec![format!("127.0.0.1:{port_a}")]),
    )
    .unwrap();

    let id = node_b.subscribe("repl.", None, None).unwrap();
    let body = doc(json!({"ts": 42}));
    let message = publish_until_delivered(&node_a, &node_b, id, "repl.oplog", &body);

    assert_eq!(message.channel, "repl.oplog");
    assert_eq!(message.body, body);

    node_a.shutdown();
    node_b.shutdown();
}
