//! TCP transport integration tests.
//!
//! Each side gets its own `Context` so delivery genuinely crosses the TCP
//! boundary rather than short-circuiting through an inproc hub.

use bytes::Bytes;
use fanline_core::prelude::*;
use std::time::{Duration, Instant};

fn pick_port() -> u16 {
    portpicker::pick_unused_port().expect("no free TCP port available")
}

/// Run with RUST_LOG=debug to watch links come up.
fn init_logs() {
    use tracing_subscriber::EnvFilter;
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .try_init();
}

fn wait_until(mut cond: impl FnMut() -> bool, what: &str) {
    let deadline = Instant::now() + Duration::from_secs(5);
    while !cond() {
        assert!(Instant::now() < deadline, "timed out waiting for {what}");
        std::thread::sleep(Duration::from_millis(10));
    }
}

fn msg(topic: &str, body: &str) -> Multipart {
    vec![
        Bytes::copy_from_slice(topic.as_bytes()),
        Bytes::copy_from_slice(body.as_bytes()),
    ]
}

#[test]
fn pub_sub_across_tcp() {
    init_logs();
    let port = pick_port();
    let endpoint = format!("tcp://127.0.0.1:{port}");

    let pub_ctx = Context::new();
    let publisher = Socket::new(&pub_ctx, SocketType::Pub);
    publisher.set_hwm(0);
    publisher.bind(&endpoint).unwrap();

    let sub_ctx = Context::new();
    let subscriber = Socket::new(&sub_ctx, SocketType::Sub);
    subscriber.set_subscribe("chat.").unwrap();
    subscriber.connect(&endpoint).unwrap();

    wait_until(|| publisher.connected_peers() > 0, "subscriber link");

    // the non-matching channel is filtered on arrival by the subscriber
    publisher.send(msg("events", "dropped")).unwrap();
    publisher.send(msg("chat.room1", "hello")).unwrap();

    assert_eq!(poll(&[&subscriber], Duration::from_secs(5)), 1);
    let got = subscriber.recv_blocking().unwrap();
    assert_eq!(got[0], &b"chat.room1"[..]);
    assert_eq!(got[1], &b"hello"[..]);

    assert_eq!(poll(&[&subscriber], Duration::from_millis(100)), 0);
}

#[test]
fn push_pull_across_tcp() {
    init_logs();
    let port = pick_port();
    let endpoint = format!("tcp://127.0.0.1:{port}");

    let pull_ctx = Context::new();
    let pull = Socket::new(&pull_ctx, SocketType::Pull);
    pull.bind(&endpoint).unwrap();

    let push_ctx = Context::new();
    let push = Socket::new(&push_ctx, SocketType::Push);
    push.connect(&endpoint).unwrap();

    wait_until(|| push.connected_peers() > 0, "push link");

    for i in 0..3u8 {
        push.send(msg("t", &i.to_string())).unwrap();
    }

    let mut bodies = Vec::new();
    while bodies.len() < 3 {
        assert_eq!(poll(&[&pull], Duration::from_secs(5)), 1);
        while let Some(frames) = pull.recv_nonblocking().unwrap() {
            bodies.push(frames[1].clone());
        }
    }
    assert_eq!(bodies, vec![Bytes::from_static(b"0"), Bytes::from_static(b"1"), Bytes::from_static(b"2")]);
}

#[test]
fn closing_the_subscriber_side_detaches_the_publisher_peer() {
    init_logs();
    let port = pick_port();
    let endpoint = format!("tcp://127.0.0.1:{port}");

    let pub_ctx = Context::new();
    let publisher = Socket::new(&pub_ctx, SocketType::Pub);
    publisher.bind(&endpoint).unwrap();

    let sub_ctx = Context::new();
    let subscriber = Socket::new(&sub_ctx, SocketType::Sub);
    subscriber.set_subscribe("").unwrap();
    subscriber.connect(&endpoint).unwrap();

    wait_until(|| publisher.connected_peers() > 0, "subscriber link");

    subscriber.close();

    // the writer notices the dead stream on the next sends
    wait_until(
        || {
            let _ = publisher.send(msg("t", "probe"));
            publisher.connected_peers() == 0
        },
        "peer teardown",
    );
}
