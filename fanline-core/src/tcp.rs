//! TCP transport plumbing.
//!
//! Listener sockets accept in a background thread. Each established stream
//! gets either a reader thread (receiving kinds: decoded messages go to the
//! owning socket's ingress queue, SUB streams are prefix-filtered on
//! arrival) or a writer thread (sending kinds: a per-peer queue drained onto
//! the wire). Outbound connections retry with the socket options' backoff;
//! a dropped outbound link reconnects until the socket closes.

use socket2::{Domain, Protocol, Type};
use std::io;
use std::net::{TcpListener, TcpStream, ToSocketAddrs};
use std::sync::Arc;
use std::thread;
use std::time::Duration;
use tracing::{debug, warn};

use crate::codec;
use crate::error::{Result, SocketError};
use crate::socket::Shared;

const ACCEPT_POLL: Duration = Duration::from_millis(25);

/// Bind a listener and start its accept thread.
pub(crate) fn listen(authority: &str, shared: &Arc<Shared>) -> Result<()> {
    let addr = authority
        .to_socket_addrs()?
        .next()
        .ok_or_else(|| unresolvable(authority))?;

    let socket = socket2::Socket::new(Domain::for_address(addr), Type::STREAM, Some(Protocol::TCP))?;
    socket.set_reuse_address(true)?;
    socket.bind(&addr.into())?;
    socket.listen(128)?;

    let listener: TcpListener = socket.into();
    listener.set_nonblocking(true)?;

    let shared = Arc::clone(shared);
    thread::Builder::new()
        .name(format!("fanline-listen-{}", addr.port()))
        .spawn(move || accept_loop(&listener, &shared))?;
    Ok(())
}

/// Start a connector thread for an outbound endpoint.
pub(crate) fn connect(authority: String, shared: Arc<Shared>) -> Result<()> {
    thread::Builder::new()
        .name("fanline-connect".to_string())
        .spawn(move || connector_loop(&authority, &shared))?;
    Ok(())
}

fn unresolvable(authority: &str) -> SocketError {
    SocketError::Io(io::Error::new(
        io::ErrorKind::AddrNotAvailable,
        format!("could not resolve {authority}"),
    ))
}

fn accept_loop(listener: &TcpListener, shared: &Arc<Shared>) {
    loop {
        if shared.closed() {
            return;
        }
        match listener.accept() {
            Ok((stream, peer)) => {
                debug!(%peer, kind = %shared.kind, "accepted connection");
                if let Err(e) = attach_accepted(stream, shared) {
                    warn!(%peer, error = %e, "failed to attach accepted connection");
                }
            }
            Err(e) if e.kind() == io::ErrorKind::WouldBlock => thread::sleep(ACCEPT_POLL),
            Err(e) => {
                warn!(error = %e, "listener failed");
                return;
            }
        }
    }
}

fn attach_accepted(stream: TcpStream, shared: &Arc<Shared>) -> io::Result<()> {
    configure(&stream, shared)?;
    if shared.kind.can_recv() {
        let shared = Arc::clone(shared);
        thread::Builder::new()
            .name("fanline-tcp-read".to_string())
            .spawn(move || reader_loop(stream, &shared))?;
        Ok(())
    } else {
        // accepted subscribers get the full feed; they filter on arrival
        spawn_writer(stream, shared, None)
    }
}

fn configure(stream: &TcpStream, shared: &Arc<Shared>) -> io::Result<()> {
    // accepted streams inherit the listener's non-blocking mode on some
    // platforms; readers and writers here are blocking
    stream.set_nonblocking(false)?;
    stream.set_nodelay(true)?;
    shared.track_stream(stream.try_clone()?);
    Ok(())
}

fn connector_loop(authority: &str, shared: &Arc<Shared>) {
    let opts = shared.options();
    let mut attempt: u32 = 0;
    loop {
        if shared.closed() {
            return;
        }
        match TcpStream::connect(authority) {
            Ok(stream) => {
                attempt = 0;
                debug!(%authority, kind = %shared.kind, "connected");
                if let Err(e) = configure(&stream, shared) {
                    warn!(%authority, error = %e, "failed to configure stream");
                } else if shared.kind.can_recv() {
                    // run the reader here; falling out means the link
                    // dropped and we reconnect
                    reader_loop(stream, shared);
                    if shared.closed() {
                        return;
                    }
                } else {
                    // the writer owns reconnection from here on
                    if spawn_writer(stream, shared, Some(authority.to_string())).is_ok() {
                        return;
                    }
                }
            }
            Err(e) => {
                debug!(%authority, error = %e, "connect failed, backing off");
            }
        }
        thread::sleep(opts.next_reconnect_ivl(attempt));
        attempt = attempt.saturating_add(1);
    }
}

fn reader_loop(mut stream: TcpStream, shared: &Arc<Shared>) {
    let Some(tx) = shared.ingress_sender() else {
        return;
    };
    let hwm = shared.options().hwm;
    loop {
        if shared.closed() {
            return;
        }
        match codec::read_multipart(&mut stream) {
            Ok(frames) => {
                if shared.kind == crate::socket_type::SocketType::Sub {
                    let topic = frames.first().map_or(&[][..], |f| f.as_ref());
                    if !shared.prefixes.lock().matches(topic) {
                        continue;
                    }
                }
                if hwm > 0 && tx.len() >= hwm {
                    continue; // lossy over the high water mark
                }
                if tx.send(frames).is_err() {
                    return;
                }
            }
            Err(e) => {
                debug!(error = %e, "tcp reader stopping");
                return;
            }
        }
    }
}

fn spawn_writer(
    mut stream: TcpStream,
    shared: &Arc<Shared>,
    reconnect_to: Option<String>,
) -> io::Result<()> {
    let (tx, rx) = flume::unbounded();
    let key = shared.add_tcp_peer(tx);
    let writer_shared = Arc::clone(shared);
    let spawned = thread::Builder::new()
        .name("fanline-tcp-write".to_string())
        .spawn(move || {
            for frames in rx.iter() {
                if let Err(e) = codec::write_multipart(&mut stream, &frames) {
                    debug!(error = %e, "tcp writer stopping");
                    break;
                }
            }
            writer_shared.remove_tcp_peer(key);
            if let Some(authority) = reconnect_to {
                if !writer_shared.closed() {
                    let _ = connect(authority, writer_shared);
                }
            }
        });
    if let Err(e) = spawned {
        shared.remove_tcp_peer(key);
        return Err(e);
    }
    Ok(())
}
