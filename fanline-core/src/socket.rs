//! Typed message endpoints.
//!
//! One `Socket` type covers the four kinds; operations not defined for a
//! kind return `SocketError::Unsupported`. A socket can bind and connect any
//! number of endpoints, inproc or TCP, and mixes them freely:
//!
//! - **PUB** `send` fans out to every attached hub (publisher-side prefix
//!   filtering) and every TCP peer (full feed, receiver filters).
//! - **SUB** receives into a single fair ingress queue; subscriptions are
//!   additive prefixes.
//! - **PUSH** `send` round-robins over connected PULL peers.
//! - **PULL** fair-queues from all connected PUSH peers.
//!
//! `close` is idempotent, detaches every peer registration, and wakes any
//! blocked receive or poll with a disconnect. All methods take `&self`; the
//! type is `Send + Sync` so a subscription entry can own one while the poll
//! path and an unsubscribe race on it.

use bytes::Bytes;
use flume::{Receiver, Sender, TryRecvError};
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::net::{Shutdown, TcpStream};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;

use crate::context::Context;
use crate::endpoint::Endpoint;
use crate::error::{Result, SocketError};
use crate::hub::{self, Hub, PeerKey, PrefixSet};
use crate::message::Multipart;
use crate::options::SocketOptions;
use crate::socket_type::SocketType;
use crate::tcp;

/// An outbound transport peer: a queue drained by a writer thread.
#[derive(Debug)]
pub(crate) struct TcpPeer {
    pub(crate) key: u64,
    pub(crate) tx: Sender<Multipart>,
}

/// State shared with the transport threads a socket spawns.
#[derive(Debug)]
pub(crate) struct Shared {
    pub(crate) kind: SocketType,
    opts: Mutex<SocketOptions>,
    closed: AtomicBool,
    ingress_tx: Mutex<Option<Sender<Multipart>>>,
    pub(crate) prefixes: Mutex<PrefixSet>,
    tcp_peers: Mutex<Vec<TcpPeer>>,
    streams: Mutex<Vec<TcpStream>>,
    next_peer: AtomicU64,
}

impl Shared {
    pub(crate) fn closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub(crate) fn options(&self) -> SocketOptions {
        self.opts.lock().clone()
    }

    fn hwm(&self) -> usize {
        self.opts.lock().hwm
    }

    /// Clone the ingress sender, or `None` once the socket is closed.
    pub(crate) fn ingress_sender(&self) -> Option<Sender<Multipart>> {
        self.ingress_tx.lock().clone()
    }

    pub(crate) fn add_tcp_peer(&self, tx: Sender<Multipart>) -> u64 {
        let key = self.next_peer.fetch_add(1, Ordering::Relaxed);
        self.tcp_peers.lock().push(TcpPeer { key, tx });
        key
    }

    pub(crate) fn remove_tcp_peer(&self, key: u64) {
        self.tcp_peers.lock().retain(|p| p.key != key);
    }

    /// Keep a handle to an accepted or established stream so `close` can
    /// shut it down and unblock its reader.
    pub(crate) fn track_stream(&self, stream: TcpStream) {
        self.streams.lock().push(stream);
    }
}

/// A typed message endpoint.
#[derive(Debug)]
pub struct Socket {
    ctx: Context,
    shared: Arc<Shared>,
    ingress_rx: Receiver<Multipart>,
    /// Messages claimed by `poll` while waiting; drained before the queue.
    stash: Mutex<VecDeque<Multipart>>,
    pub_hubs: Mutex<Vec<Arc<Hub>>>,
    push_hubs: Mutex<Vec<Arc<Hub>>>,
    sub_regs: Mutex<Vec<(Arc<Hub>, PeerKey)>>,
    pull_regs: Mutex<Vec<(Arc<Hub>, PeerKey)>>,
    rr: AtomicUsize,
}

impl Socket {
    /// Create a socket of the given kind within a context.
    #[must_use]
    pub fn new(ctx: &Context, kind: SocketType) -> Self {
        Self::with_options(ctx, kind, SocketOptions::default())
    }

    /// Create a socket with explicit options.
    #[must_use]
    pub fn with_options(ctx: &Context, kind: SocketType, opts: SocketOptions) -> Self {
        let (ingress_tx, ingress_rx) = flume::unbounded();
        Self {
            ctx: ctx.clone(),
            shared: Arc::new(Shared {
                kind,
                opts: Mutex::new(opts),
                closed: AtomicBool::new(false),
                ingress_tx: Mutex::new(Some(ingress_tx)),
                prefixes: Mutex::new(PrefixSet::new()),
                tcp_peers: Mutex::new(Vec::new()),
                streams: Mutex::new(Vec::new()),
                next_peer: AtomicU64::new(1),
            }),
            ingress_rx,
            stash: Mutex::new(VecDeque::new()),
            pub_hubs: Mutex::new(Vec::new()),
            push_hubs: Mutex::new(Vec::new()),
            sub_regs: Mutex::new(Vec::new()),
            pull_regs: Mutex::new(Vec::new()),
            rr: AtomicUsize::new(0),
        }
    }

    #[must_use]
    pub fn kind(&self) -> SocketType {
        self.shared.kind
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.shared.closed()
    }

    /// Set the high water mark (0 = unbounded).
    pub fn set_hwm(&self, hwm: usize) {
        self.shared.opts.lock().hwm = hwm;
    }

    /// Add a channel-prefix subscription (SUB only; additive).
    ///
    /// # Errors
    ///
    /// Returns `Unsupported` for non-SUB sockets.
    pub fn set_subscribe(&self, prefix: impl Into<Bytes>) -> Result<()> {
        if self.shared.kind != SocketType::Sub {
            return Err(SocketError::Unsupported(self.shared.kind.as_str()));
        }
        let prefix = prefix.into();
        self.shared.prefixes.lock().insert(prefix.clone());
        for (hub, key) in self.sub_regs.lock().iter() {
            hub.subscribe(*key, prefix.clone());
        }
        Ok(())
    }

    /// Bind an endpoint.
    ///
    /// For inproc endpoints bind and connect are symmetric: both attach the
    /// socket to the named hub by role.
    ///
    /// # Errors
    ///
    /// Returns endpoint parse failures, listener setup failures, or `Closed`.
    pub fn bind(&self, endpoint: &str) -> Result<()> {
        self.ensure_open()?;
        match Endpoint::parse(endpoint)? {
            Endpoint::Inproc(name) => self.attach_inproc(&name),
            Endpoint::Tcp(authority) => tcp::listen(&authority, &self.shared),
        }
    }

    /// Connect to an endpoint. TCP connections are established by a
    /// background thread with backoff; this call never blocks on the wire.
    ///
    /// # Errors
    ///
    /// Returns endpoint parse failures, thread spawn failures, or `Closed`.
    pub fn connect(&self, endpoint: &str) -> Result<()> {
        self.ensure_open()?;
        match Endpoint::parse(endpoint)? {
            Endpoint::Inproc(name) => self.attach_inproc(&name),
            Endpoint::Tcp(authority) => tcp::connect(authority, Arc::clone(&self.shared)),
        }
    }

    fn attach_inproc(&self, name: &str) -> Result<()> {
        let hub = self.ctx.hub(name);
        match self.shared.kind {
            SocketType::Pub => self.pub_hubs.lock().push(hub),
            SocketType::Push => self.push_hubs.lock().push(hub),
            SocketType::Sub => {
                let tx = self.shared.ingress_sender().ok_or(SocketError::Closed)?;
                let key = hub.attach_sub(self.shared.prefixes.lock().clone(), tx);
                self.sub_regs.lock().push((hub, key));
            }
            SocketType::Pull => {
                let tx = self.shared.ingress_sender().ok_or(SocketError::Closed)?;
                let key = hub.attach_pull(tx);
                self.pull_regs.lock().push((hub, key));
            }
        }
        Ok(())
    }

    /// Send a multipart message (PUB and PUSH only).
    ///
    /// PUB is fire-and-forget: peers over their high water mark or already
    /// gone are skipped. PUSH returns `NoPeers` when nothing is connected.
    ///
    /// # Errors
    ///
    /// Returns `Closed`, `Unsupported`, `NoPeers`, or a protocol error for
    /// an empty message.
    pub fn send(&self, frames: Multipart) -> Result<()> {
        self.ensure_open()?;
        if frames.is_empty() {
            return Err(SocketError::protocol("cannot send an empty message"));
        }
        let hwm = self.shared.hwm();
        match self.shared.kind {
            SocketType::Pub => {
                for h in self.pub_hubs.lock().iter() {
                    h.publish(&frames, hwm);
                }
                let mut peers = self.shared.tcp_peers.lock();
                peers.retain(|p| !p.tx.is_disconnected());
                for peer in peers.iter() {
                    hub::offer(&peer.tx, frames.clone(), hwm);
                }
                Ok(())
            }
            SocketType::Push => self.push_round_robin(frames, hwm),
            SocketType::Sub | SocketType::Pull => {
                Err(SocketError::Unsupported(self.shared.kind.as_str()))
            }
        }
    }

    fn push_round_robin(&self, frames: Multipart, hwm: usize) -> Result<()> {
        let mut targets: Vec<Sender<Multipart>> = Vec::new();
        for hub in self.push_hubs.lock().iter() {
            targets.extend(hub.pull_senders());
        }
        for peer in self.shared.tcp_peers.lock().iter() {
            targets.push(peer.tx.clone());
        }
        targets.retain(|t| !t.is_disconnected());
        if targets.is_empty() {
            return Err(SocketError::NoPeers);
        }

        let start = self.rr.fetch_add(1, Ordering::Relaxed);
        for i in 0..targets.len() {
            let tx = &targets[(start + i) % targets.len()];
            if hub::offer(tx, frames.clone(), hwm) {
                return Ok(());
            }
        }
        // every peer over its high water mark: fire-and-forget drop
        Ok(())
    }

    /// Receive without blocking (SUB and PULL only).
    ///
    /// `Ok(None)` means no message is currently queued. Messages that were
    /// already queued when the socket was closed are still drained before
    /// the disconnect error surfaces.
    ///
    /// # Errors
    ///
    /// Returns `Closed` once the socket is closed and drained.
    pub fn recv_nonblocking(&self) -> Result<Option<Multipart>> {
        if !self.shared.kind.can_recv() {
            return Err(SocketError::Unsupported(self.shared.kind.as_str()));
        }
        if let Some(frames) = self.stash.lock().pop_front() {
            return Ok(Some(frames));
        }
        match self.ingress_rx.try_recv() {
            Ok(frames) => Ok(Some(frames)),
            Err(TryRecvError::Empty) => {
                if self.shared.closed() {
                    Err(SocketError::Closed)
                } else {
                    Ok(None)
                }
            }
            Err(TryRecvError::Disconnected) => Err(SocketError::Closed),
        }
    }

    /// Receive, blocking until a message arrives or the socket is closed
    /// (SUB and PULL only).
    ///
    /// # Errors
    ///
    /// Returns `Closed` once the socket is closed and drained.
    pub fn recv_blocking(&self) -> Result<Multipart> {
        if !self.shared.kind.can_recv() {
            return Err(SocketError::Unsupported(self.shared.kind.as_str()));
        }
        if let Some(frames) = self.stash.lock().pop_front() {
            return Ok(frames);
        }
        self.ingress_rx.recv().map_err(|_| SocketError::Closed)
    }

    /// Number of transport peers currently attached on the sending side.
    ///
    /// Useful to tell whether a background TCP connect has completed.
    #[must_use]
    pub fn connected_peers(&self) -> usize {
        let tcp = self
            .shared
            .tcp_peers
            .lock()
            .iter()
            .filter(|p| !p.tx.is_disconnected())
            .count();
        let inproc_pull: usize = self
            .push_hubs
            .lock()
            .iter()
            .map(|h| h.pull_senders().len())
            .sum();
        tcp + self.pub_hubs.lock().len() + inproc_pull
    }

    /// Close the socket. Idempotent.
    ///
    /// Detaches every hub registration and transport peer, drops the ingress
    /// sender, and shuts down tracked streams; a blocked `recv` or `poll`
    /// wakes with a disconnect.
    pub fn close(&self) {
        if self.shared.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        for (hub, key) in self.sub_regs.lock().drain(..) {
            hub.detach_sub(key);
        }
        for (hub, key) in self.pull_regs.lock().drain(..) {
            hub.detach_pull(key);
        }
        self.pub_hubs.lock().clear();
        self.push_hubs.lock().clear();
        self.shared.tcp_peers.lock().clear();
        *self.shared.ingress_tx.lock() = None;
        for stream in self.shared.streams.lock().drain(..) {
            let _ = stream.shutdown(Shutdown::Both);
        }
    }

    fn ensure_open(&self) -> Result<()> {
        if self.shared.closed() {
            Err(SocketError::Closed)
        } else {
            Ok(())
        }
    }

    /// Whether a `recv_nonblocking` would yield something right now,
    /// including the disconnect of a closed socket.
    pub(crate) fn has_pending(&self) -> bool {
        !self.stash.lock().is_empty()
            || !self.ingress_rx.is_empty()
            || self.ingress_rx.is_disconnected()
    }

    pub(crate) fn ingress(&self) -> &Receiver<Multipart> {
        &self.ingress_rx
    }

    pub(crate) fn stash_push(&self, frames: Multipart) {
        self.stash.lock().push_back(frames);
    }
}

impl Drop for Socket {
    fn drop(&mut self) {
        self.close();
    }
}
