//! The pub/sub plane facade.
//!
//! `PubSub` is the owning context for one process's messaging plane: the
//! socket context, both kill switches, the subscription registry, the egress
//! socket behind its send lock, and the background threads (local relay and
//! reaper; relay peers run a second forwarder following the rest of their
//! cluster). Clones share the plane; the last one torn down joins the
//! threads.
//!
//! Two locks exist: the registry lock and the send lock. They are never held
//! together; the registry lock is never held across a socket receive, send
//! or poll, and the send lock covers exactly one egress send at a time.

use std::collections::{BTreeMap, BTreeSet, BinaryHeap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use parking_lot::{Condvar, Mutex};
use tracing::{debug, error, warn};

use fanline_core::prelude::*;

use crate::config::PlaneOptions;
use crate::document::{self, Document, Matcher, Projection};
use crate::error::{PubSubError, Result};
use crate::id::SubscriptionId;
use crate::message::SubscriptionMessage;
use crate::registry::{Checkout, Registry, SubscriptionInfo, Unsub};
use crate::topology::{self, INT_PUBSUB_ENDPOINT};
use crate::wire;

/// One wait slice: how often an active poll checks for unsubscribes.
const MAX_POLL_INTERVAL: Duration = Duration::from_secs(1);

const ERR_NOT_FOUND: &str = "Subscription not found.";
const ERR_POLL_ACTIVE: &str = "Poll currently active.";
const ERR_POLL_INTERRUPTED: &str = "Poll interrupted by unsubscribe.";
const ERR_RECV: &str = "Error receiving messages from socket.";

/// What a poll call hands back.
#[derive(Debug, Default)]
pub struct PollReply {
    /// Delivered messages; popping the heap yields the delivery order.
    pub messages: BinaryHeap<SubscriptionMessage>,
    /// Per-subscription failures, keyed by id.
    pub errors: BTreeMap<SubscriptionId, String>,
    /// The max poll window elapsed with nothing to deliver; reissue the
    /// poll to keep waiting.
    pub partial: bool,
    /// Wall-clock milliseconds spent waiting.
    pub millis_polled: u64,
}

impl PollReply {
    /// Drain the heap into delivery order.
    #[must_use]
    pub fn into_ordered(self) -> Vec<SubscriptionMessage> {
        let mut ordered = self.messages.into_sorted_vec();
        ordered.reverse();
        ordered
    }
}

/// Outcome of an unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unsubscribed {
    /// The entry is gone and its socket closed.
    Removed,
    /// A poll holds the socket; removal happens at its next slice boundary.
    Deferred,
}

#[derive(Debug)]
struct Switches {
    enabled: AtomicBool,
    publish_events: AtomicBool,
}

impl Switches {
    fn kill(&self) {
        self.enabled.store(false, Ordering::SeqCst);
        self.publish_events.store(false, Ordering::SeqCst);
    }
}

#[derive(Default)]
struct ShutdownSignal {
    stopped: Mutex<bool>,
    cv: Condvar,
}

impl ShutdownSignal {
    /// Sleep for up to `interval`, returning early on shutdown. True means
    /// the plane is stopping.
    fn sleep(&self, interval: Duration) -> bool {
        let mut stopped = self.stopped.lock();
        if !*stopped {
            let _ = self.cv.wait_for(&mut stopped, interval);
        }
        *stopped
    }

    /// Returns whether shutdown had already been triggered.
    fn trigger(&self) -> bool {
        let mut stopped = self.stopped.lock();
        let previous = *stopped;
        *stopped = true;
        self.cv.notify_all();
        previous
    }

    fn is_stopped(&self) -> bool {
        *self.stopped.lock()
    }
}

/// A process's pub/sub plane.
#[derive(Clone)]
pub struct PubSub {
    inner: Arc<Inner>,
}

struct Inner {
    ctx: Context,
    switches: Arc<Switches>,
    registry: Registry,
    /// The send lock: the egress socket is not safe for concurrent sends.
    egress: Mutex<Socket>,
    ingress: Arc<Socket>,
    internal_pub: Arc<Socket>,
    external_pub: Option<Arc<Socket>>,
    relay_feed: Option<Arc<Socket>>,
    shutdown: Arc<ShutdownSignal>,
    threads: Mutex<Vec<JoinHandle<()>>>,
    max_window: Duration,
}

impl PubSub {
    /// Bring the plane up for this process's role.
    ///
    /// # Errors
    ///
    /// A socket creation or bind failure during startup is fatal: both kill
    /// switches stay off, no background thread runs, and the error is
    /// returned.
    pub fn new(opts: PlaneOptions) -> Result<Self> {
        let ctx = Context::new();
        let switches = Arc::new(Switches {
            enabled: AtomicBool::new(opts.enabled),
            publish_events: AtomicBool::new(opts.enabled && opts.publish_data_events),
        });
        let max_window = opts.max_poll_window();

        if !opts.enabled {
            // disabled plane: no wiring, no threads, every call bounces
            return Ok(Self {
                inner: Arc::new(Inner {
                    egress: Mutex::new(Socket::new(&ctx, SocketType::Pub)),
                    ingress: Arc::new(Socket::new(&ctx, SocketType::Sub)),
                    internal_pub: Arc::new(Socket::new(&ctx, SocketType::Pub)),
                    external_pub: None,
                    relay_feed: None,
                    ctx,
                    switches,
                    registry: Registry::new(),
                    shutdown: Arc::new(ShutdownSignal::default()),
                    threads: Mutex::new(Vec::new()),
                    max_window,
                }),
            });
        }

        let topo = match topology::bootstrap(&ctx, &opts) {
            Ok(topo) => topo,
            Err(e) => {
                error!(error = %e, "error initializing pubsub sockets, turning pubsub off");
                switches.kill();
                return Err(e);
            }
        };

        let registry = Registry::new();
        let shutdown = Arc::new(ShutdownSignal::default());
        let mut threads = Vec::new();

        // local relay: proxy incoming messages to the internal publisher to
        // be received by clients; relay peers also feed their republisher
        {
            let ingress = Arc::clone(&topo.ingress);
            let internal = Arc::clone(&topo.internal_pub);
            let external = topo.external_pub.clone();
            let switches = Arc::clone(&switches);
            let shutdown = Arc::clone(&shutdown);
            threads.push(spawn_named("pubsub-relay", move || {
                let result = match &external {
                    Some(external) => {
                        proxy_fanout(&ingress, &[external.as_ref(), internal.as_ref()])
                    }
                    None => proxy(&ingress, &internal),
                };
                if let Err(e) = result {
                    if !shutdown.is_stopped() {
                        warn!(error = %e, "pubsub relay proxy failed, turning pubsub off");
                        switches.kill();
                    }
                }
            })?);
        }

        // relay peers follow the rest of their cluster into the internal
        // publisher
        if let Some(feed) = topo.relay_feed.clone() {
            let internal = Arc::clone(&topo.internal_pub);
            let shutdown = Arc::clone(&shutdown);
            threads.push(spawn_named("pubsub-relay-feed", move || {
                if let Err(e) = proxy(&feed, &internal) {
                    if !shutdown.is_stopped() {
                        warn!(error = %e, "relay feed proxy stopped");
                    }
                }
            })?);
        }

        // clean up subscriptions that have not been polled in a full window
        {
            let registry = registry.clone();
            let shutdown = Arc::clone(&shutdown);
            threads.push(spawn_named("pubsub-reaper", move || loop {
                if shutdown.sleep(max_window) {
                    return;
                }
                let reaped = registry.sweep();
                if reaped > 0 {
                    debug!(reaped, "reaped idle subscriptions");
                }
            })?);
        }

        Ok(Self {
            inner: Arc::new(Inner {
                ctx,
                switches,
                registry,
                egress: Mutex::new(topo.egress),
                ingress: topo.ingress,
                internal_pub: topo.internal_pub,
                external_pub: topo.external_pub,
                relay_feed: topo.relay_feed,
                shutdown,
                threads: Mutex::new(threads),
                max_window,
            }),
        })
    }

    #[must_use]
    pub fn is_enabled(&self) -> bool {
        self.inner.switches.enabled.load(Ordering::SeqCst)
    }

    fn ensure_enabled(&self) -> Result<()> {
        if self.is_enabled() {
            Ok(())
        } else {
            Err(PubSubError::Disabled)
        }
    }

    /// Publish a document to a channel, stamped with the current clock.
    ///
    /// Delivery is fire-and-forget: transport trouble is logged, not
    /// surfaced.
    ///
    /// # Errors
    ///
    /// Returns `Disabled` when the kill switch is off, or a serialization
    /// error for an unencodable body.
    pub fn publish(&self, channel: &str, message: &Document) -> Result<()> {
        self.publish_at(channel, message, now_millis())
    }

    /// Publish with an explicit timestamp.
    ///
    /// # Errors
    ///
    /// As `publish`.
    pub fn publish_at(&self, channel: &str, message: &Document, timestamp: u64) -> Result<()> {
        self.ensure_enabled()?;
        let body = document::encode(message)?;
        let frames = wire::encode(channel, body, timestamp);

        let egress = self.inner.egress.lock();
        if let Err(e) = egress.send(frames) {
            warn!(channel, error = %e, "failed to publish message");
        }
        Ok(())
    }

    /// Publish a data change event, honoring the secondary kill switch.
    ///
    /// # Errors
    ///
    /// Returns `Disabled` when either switch is off.
    pub fn publish_event(&self, channel: &str, message: &Document) -> Result<()> {
        if !self.inner.switches.publish_events.load(Ordering::SeqCst) {
            return Err(PubSubError::Disabled);
        }
        self.publish(channel, message)
    }

    /// Create a subscription on a channel prefix, with optional filter and
    /// projection over delivered bodies.
    ///
    /// # Errors
    ///
    /// Returns `Disabled` or a socket setup failure.
    pub fn subscribe(
        &self,
        channel: &str,
        filter: Option<Document>,
        projection: Option<Document>,
    ) -> Result<SubscriptionId> {
        self.ensure_enabled()?;

        let socket = Socket::new(&self.inner.ctx, SocketType::Sub);
        socket.set_subscribe(channel.to_owned())?;
        socket.set_hwm(0);
        socket.connect(INT_PUBSUB_ENDPOINT)?;

        let info = SubscriptionInfo::new(
            socket,
            filter.map(Matcher::new),
            projection.map(Projection::new),
        );
        let id = SubscriptionId::generate();
        self.inner.registry.insert(id, info);
        Ok(id)
    }

    /// Long-poll a set of subscriptions.
    ///
    /// Waits up to `timeout_millis` (negative or oversized values clamp to
    /// the max poll window) for traffic on any of the subscriptions, then
    /// drains every socket without blocking. Per-subscription failures land
    /// in the reply's error map; they never abort the call.
    ///
    /// # Errors
    ///
    /// Returns `Disabled` when the kill switch is off.
    pub fn poll(&self, ids: &[SubscriptionId], timeout_millis: i64) -> Result<PollReply> {
        self.ensure_enabled()?;
        let mut reply = PollReply::default();

        // Phase 1: check out every requested subscription; ids that cannot
        // be checked out contribute an error and drop out of this poll
        let requested: BTreeSet<SubscriptionId> = ids.iter().copied().collect();
        let mut held = Vec::with_capacity(requested.len());
        for id in requested {
            match self.inner.registry.checkout(id) {
                Checkout::Ready(guard) => held.push(guard),
                Checkout::NotFound | Checkout::Dying => {
                    reply.errors.insert(id, ERR_NOT_FOUND.to_string());
                }
                Checkout::Busy => {
                    reply.errors.insert(id, ERR_POLL_ACTIVE.to_string());
                }
            }
        }
        if held.is_empty() {
            return Ok(reply);
        }

        let max_window = self.inner.max_window.as_millis() as u64;
        let timeout = if timeout_millis < 0 || timeout_millis as u64 > max_window {
            max_window
        } else {
            timeout_millis as u64
        };

        // Phase 2: wait in slices, coming up for air to honor unsubscribes
        let slice_millis = MAX_POLL_INTERVAL.as_millis() as u64;
        loop {
            let remaining = timeout.saturating_sub(reply.millis_polled);
            if remaining == 0 {
                break;
            }
            let slice = slice_millis.min(remaining);

            let ready = {
                let sockets: Vec<&Socket> = held.iter().map(|g| &g.info().socket).collect();
                poll(&sockets, Duration::from_millis(slice))
            };
            if ready > 0 {
                break;
            }

            let mut i = 0;
            while i < held.len() {
                if self.inner.registry.wants_unsub(held[i].info()) {
                    let guard = held.swap_remove(i);
                    let id = guard.id();
                    reply.errors.insert(id, ERR_POLL_INTERRUPTED.to_string());
                    drop(guard);
                    self.inner.registry.force_close_and_remove(id);
                } else {
                    i += 1;
                }
            }
            if held.is_empty() {
                return Ok(reply);
            }

            reply.millis_polled += slice;
            if reply.millis_polled >= max_window {
                // signal the caller to reissue the poll; dropping the
                // guards checks every socket back in
                reply.partial = true;
                return Ok(reply);
            }
        }

        // Phase 3: drain non-blockingly, filter then project, queue in
        // delivery order
        for guard in &held {
            let id = guard.id();
            let info = guard.info();
            loop {
                match info.socket.recv_nonblocking() {
                    Ok(Some(frames)) => match decode_delivery(id, info, &frames) {
                        Ok(Some(message)) => {
                            reply.messages.push(message);
                        }
                        Ok(None) => {} // dropped by the filter
                        Err(e) => {
                            debug!(subscription = %id, error = %e, "malformed message");
                            reply.errors.insert(id, e.to_string());
                            break;
                        }
                    },
                    Ok(None) => break,
                    Err(e) => {
                        debug!(subscription = %id, error = %e, "receive failed");
                        reply.errors.insert(id, ERR_RECV.to_string());
                        break;
                    }
                }
            }
        }

        drop(held); // checks every socket back in
        Ok(reply)
    }

    /// End a subscription.
    ///
    /// With `force`, the entry is gone and the socket closed when this
    /// returns; a concurrent poll on the id observes the socket disappear.
    /// Without it, an entry held by a live poll is flagged and removed at
    /// that poll's next slice boundary.
    ///
    /// # Errors
    ///
    /// Returns `Disabled` or `NotFound`.
    pub fn unsubscribe(&self, id: SubscriptionId, force: bool) -> Result<Unsubscribed> {
        self.ensure_enabled()?;
        if force {
            if self.inner.registry.force_close_and_remove(id) {
                Ok(Unsubscribed::Removed)
            } else {
                Err(PubSubError::NotFound(id))
            }
        } else {
            match self.inner.registry.mark_unsub(id) {
                Unsub::Removed => Ok(Unsubscribed::Removed),
                Unsub::Deferred => Ok(Unsubscribed::Deferred),
                Unsub::NotFound => Err(PubSubError::NotFound(id)),
            }
        }
    }

    /// Tear the plane down: stop the background threads, close every
    /// socket, and drop all subscriptions. Also runs when the last clone is
    /// dropped. Idempotent.
    pub fn shutdown(&self) {
        self.inner.teardown();
    }
}

impl Inner {
    fn teardown(&self) {
        if self.shutdown.trigger() {
            return;
        }
        self.switches.kill();

        // closing the ingress ends the relay proxy
        self.ingress.close();
        if let Some(feed) = &self.relay_feed {
            feed.close();
        }
        if let Some(external) = &self.external_pub {
            external.close();
        }
        self.internal_pub.close();
        self.egress.lock().close();
        self.registry.clear();

        for handle in self.threads.lock().drain(..) {
            let _ = handle.join();
        }
    }
}

impl Drop for Inner {
    fn drop(&mut self) {
        self.teardown();
    }
}

fn spawn_named(
    name: &str,
    body: impl FnOnce() + Send + 'static,
) -> Result<JoinHandle<()>> {
    thread::Builder::new()
        .name(name.to_string())
        .spawn(body)
        .map_err(|e| PubSubError::Bootstrap(format!("failed to spawn {name}: {e}")))
}

fn decode_delivery(
    id: SubscriptionId,
    info: &SubscriptionInfo,
    frames: &Multipart,
) -> Result<Option<SubscriptionMessage>> {
    let decoded = wire::decode(frames)?;
    let body = document::decode(&decoded.body)?;

    if let Some(filter) = &info.filter {
        if !filter.matches(&body) {
            return Ok(None);
        }
    }
    let body = match &info.projection {
        Some(projection) => projection.transform(&body),
        None => body,
    };

    Ok(Some(SubscriptionMessage {
        subscription_id: id,
        channel: decoded.channel,
        body,
        timestamp: decoded.timestamp,
    }))
}

fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or_default()
}
