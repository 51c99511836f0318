//! In-process rendezvous hubs.
//!
//! Responsibilities:
//! - Rendezvous point for one `inproc://` endpoint name: sockets attach by
//!   role (subscriber, pull binding, publisher or pusher) in any order, so
//!   connect-before-bind works.
//! - Publisher-side prefix filtering: a published message is matched against
//!   every subscriber's prefix set before fanout, so a subscribe socket never
//!   sees traffic outside its subscription.
//! - Zero-copy fanout via cloned `Vec<Bytes>`.
//!
//! Locking: each hub owns its peer tables behind its own mutexes; no lock is
//! held while a message is handed to flume.

use bytes::Bytes;
use flume::{Sender, TrySendError};
use hashbrown::HashMap;
use parking_lot::Mutex;
use smallvec::SmallVec;
use std::sync::atomic::{AtomicU64, Ordering};

use crate::message::Multipart;

/// Compact integer ID for attached peers.
pub type PeerKey = u64;

/// Additive prefix subscription set.
///
/// The empty prefix matches every topic; an empty *set* matches nothing
/// (a subscriber with no subscriptions receives no traffic).
#[derive(Debug, Clone, Default)]
pub struct PrefixSet {
    prefixes: SmallVec<[Bytes; 2]>,
}

impl PrefixSet {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a prefix. Duplicates are ignored.
    pub fn insert(&mut self, prefix: Bytes) {
        if !self.prefixes.iter().any(|p| *p == prefix) {
            self.prefixes.push(prefix);
        }
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.prefixes.is_empty()
    }

    /// Check a topic against all prefixes.
    #[must_use]
    pub fn matches(&self, topic: &[u8]) -> bool {
        self.prefixes.iter().any(|p| topic.starts_with(p))
    }
}

#[derive(Debug)]
struct SubPeer {
    prefixes: PrefixSet,
    tx: Sender<Multipart>,
}

/// Rendezvous state for a single inproc endpoint.
#[derive(Debug, Default)]
pub struct Hub {
    next_key: AtomicU64,
    subs: Mutex<HashMap<PeerKey, SubPeer>>,
    pulls: Mutex<Vec<(PeerKey, Sender<Multipart>)>>,
}

impl Hub {
    fn alloc_key(&self) -> PeerKey {
        // reserve 0
        self.next_key.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Attach a subscriber peer with its current prefix set.
    pub fn attach_sub(&self, prefixes: PrefixSet, tx: Sender<Multipart>) -> PeerKey {
        let key = self.alloc_key();
        self.subs.lock().insert(key, SubPeer { prefixes, tx });
        key
    }

    /// Add a prefix to an attached subscriber.
    pub fn subscribe(&self, key: PeerKey, prefix: Bytes) {
        if let Some(peer) = self.subs.lock().get_mut(&key) {
            peer.prefixes.insert(prefix);
        }
    }

    /// Detach a subscriber peer (used on socket close).
    pub fn detach_sub(&self, key: PeerKey) {
        self.subs.lock().remove(&key);
    }

    /// Attach a pull binding: the ingress queue PUSH peers feed into.
    pub fn attach_pull(&self, tx: Sender<Multipart>) -> PeerKey {
        let key = self.alloc_key();
        self.pulls.lock().push((key, tx));
        key
    }

    /// Detach a pull binding.
    pub fn detach_pull(&self, key: PeerKey) {
        self.pulls.lock().retain(|(k, _)| *k != key);
    }

    /// Snapshot the live pull targets for a PUSH send.
    #[must_use]
    pub fn pull_senders(&self) -> Vec<Sender<Multipart>> {
        self.pulls
            .lock()
            .iter()
            .map(|(_, tx)| tx.clone())
            .collect()
    }

    /// Fan a published message out to every matching subscriber.
    ///
    /// Frame 0 is the topic. Returns the number of peers the message was
    /// handed to; peers over their high water mark or already gone are
    /// skipped (lossy publish).
    pub fn publish(&self, frames: &Multipart, hwm: usize) -> usize {
        let Some(topic) = frames.first() else {
            return 0;
        };

        let mut delivered = 0;
        let subs = self.subs.lock();
        for peer in subs.values() {
            if peer.prefixes.matches(topic) && offer(&peer.tx, frames.clone(), hwm) {
                delivered += 1;
            }
        }
        delivered
    }
}

/// Hand a message to a queue, honoring the logical high water mark.
///
/// Returns false if the message was dropped (queue full or receiver gone).
pub(crate) fn offer(tx: &Sender<Multipart>, frames: Multipart, hwm: usize) -> bool {
    if hwm > 0 && tx.len() >= hwm {
        return false;
    }
    match tx.try_send(frames) {
        Ok(()) => true,
        Err(TrySendError::Full(_) | TrySendError::Disconnected(_)) => false,
    }
}
