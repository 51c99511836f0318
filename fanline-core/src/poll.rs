//! Fair readiness poll across sockets.
//!
//! `poll` reports how many of the given sockets have something for
//! `recv_nonblocking` to yield, waiting up to the timeout when none do. It
//! never consumes a message: a message claimed from a queue while waiting is
//! stashed on its socket and handed back by the next receive. A closed
//! socket counts as ready so the caller observes the disconnect when it
//! drains.

use flume::select::SelectError;
use std::time::Duration;

use crate::socket::Socket;

/// Wait up to `timeout` for any socket to become readable.
///
/// Returns the number of ready sockets. Zero means the timeout elapsed.
/// Fairness comes from the underlying channel selector; callers are expected
/// to drain every socket after a ready poll, not just one.
#[must_use]
pub fn poll(sockets: &[&Socket], timeout: Duration) -> usize {
    let ready = sockets.iter().filter(|s| s.has_pending()).count();
    if ready > 0 || timeout.is_zero() || sockets.is_empty() {
        return ready;
    }

    let mut selector = flume::Selector::new();
    for (i, socket) in sockets.iter().enumerate() {
        selector = selector.recv(socket.ingress(), move |res| (i, res));
    }

    match selector.wait_timeout(timeout) {
        Ok((i, Ok(frames))) => {
            sockets[i].stash_push(frames);
            1
        }
        // a disconnected socket is ready: draining it yields the error
        Ok((_, Err(_))) => 1,
        Err(SelectError::Timeout) => 0,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::Context;
    use crate::socket_type::SocketType;
    use bytes::Bytes;
    use std::time::Instant;

    fn plumbing(ctx: &Context, endpoint: &str) -> (Socket, Socket) {
        let publisher = Socket::new(ctx, SocketType::Pub);
        publisher.bind(endpoint).unwrap();
        let subscriber = Socket::new(ctx, SocketType::Sub);
        subscriber.set_subscribe("").unwrap();
        subscriber.connect(endpoint).unwrap();
        (publisher, subscriber)
    }

    #[test]
    fn poll_times_out_when_idle() {
        let ctx = Context::new();
        let (_publisher, subscriber) = plumbing(&ctx, "inproc://poll-idle");

        let start = Instant::now();
        let ready = poll(&[&subscriber], Duration::from_millis(50));
        assert_eq!(ready, 0);
        assert!(start.elapsed() >= Duration::from_millis(50));
    }

    #[test]
    fn poll_sees_queued_messages_immediately() {
        let ctx = Context::new();
        let (publisher, subscriber) = plumbing(&ctx, "inproc://poll-queued");

        publisher
            .send(vec![Bytes::from_static(b"t"), Bytes::from_static(b"1")])
            .unwrap();

        let ready = poll(&[&subscriber], Duration::from_secs(5));
        assert_eq!(ready, 1);
        assert!(subscriber.recv_nonblocking().unwrap().is_some());
    }

    #[test]
    fn message_claimed_during_wait_is_not_lost() {
        let ctx = Context::new();
        let (publisher, subscriber) = plumbing(&ctx, "inproc://poll-stash");

        let handle = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(30));
            publisher
                .send(vec![Bytes::from_static(b"t"), Bytes::from_static(b"late")])
                .unwrap();
            publisher
        });

        let ready = poll(&[&subscriber], Duration::from_secs(5));
        assert_eq!(ready, 1);
        let got = subscriber.recv_nonblocking().unwrap().unwrap();
        assert_eq!(got[1], &b"late"[..]);

        let _publisher = handle.join().unwrap();
    }

    #[test]
    fn closed_socket_is_ready() {
        let ctx = Context::new();
        let (_publisher, subscriber) = plumbing(&ctx, "inproc://poll-closed");

        subscriber.close();
        let ready = poll(&[&subscriber], Duration::from_secs(5));
        assert_eq!(ready, 1);
        assert!(subscriber.recv_nonblocking().is_err());
    }

    #[test]
    fn zero_timeout_never_blocks() {
        let ctx = Context::new();
        let (_publisher, subscriber) = plumbing(&ctx, "inproc://poll-zero");

        let start = Instant::now();
        assert_eq!(poll(&[&subscriber], Duration::ZERO), 0);
        assert!(start.elapsed() < Duration::from_millis(20));
    }
}
