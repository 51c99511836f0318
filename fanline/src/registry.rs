//! The subscription registry.
//!
//! A single mutex guards the id map; the entry flags are only read and
//! written while that lock is held (they are atomics purely so the entries
//! can be shared without a second lock level). The socket inside an entry is
//! touched without the lock only after a successful checkout, which is what
//! makes "at most one thread on a socket" hold: either a poll owns it
//! through a `CheckedOut` guard, or removal closes it under the lock.

use hashbrown::HashMap;
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::document::{Matcher, Projection};
use crate::id::SubscriptionId;
use fanline_core::socket::Socket;

/// Per-subscriber state: the subscribe-side socket, the optional delivery
/// adapters, and the three lifecycle flags.
pub(crate) struct SubscriptionInfo {
    pub(crate) socket: Socket,
    pub(crate) filter: Option<Matcher>,
    pub(crate) projection: Option<Projection>,

    /// A poll currently holds this socket; other polls bounce.
    in_use: AtomicBool,

    /// An unsubscribe arrived while in use; honor it at the next slice
    /// boundary.
    should_unsub: AtomicBool,

    /// Polled since the reaper's last pass; cleared each sweep.
    polled_recently: AtomicBool,
}

impl SubscriptionInfo {
    pub(crate) fn new(
        socket: Socket,
        filter: Option<Matcher>,
        projection: Option<Projection>,
    ) -> Self {
        Self {
            socket,
            filter,
            projection,
            in_use: AtomicBool::new(false),
            should_unsub: AtomicBool::new(false),
            polled_recently: AtomicBool::new(true),
        }
    }
}

/// Outcome of a checkout attempt.
pub(crate) enum Checkout<'r> {
    Ready(CheckedOut<'r>),
    NotFound,
    Busy,
    Dying,
}

/// Outcome of a cooperative unsubscribe.
#[derive(Debug, PartialEq, Eq)]
pub(crate) enum Unsub {
    Removed,
    Deferred,
    NotFound,
}

/// A checked-out subscription. Dropping the guard checks the socket back in
/// on every exit path, normal or not.
pub(crate) struct CheckedOut<'r> {
    registry: &'r Registry,
    id: SubscriptionId,
    info: Arc<SubscriptionInfo>,
}

impl CheckedOut<'_> {
    pub(crate) fn id(&self) -> SubscriptionId {
        self.id
    }

    pub(crate) fn info(&self) -> &SubscriptionInfo {
        &self.info
    }
}

impl Drop for CheckedOut<'_> {
    fn drop(&mut self) {
        self.registry.checkin(&self.info);
    }
}

/// Thread-safe map from subscription id to subscription state.
///
/// Clones share the same map; background threads hold a clone rather than
/// the owning plane, so tearing the plane down is not a reference cycle.
#[derive(Clone, Default)]
pub(crate) struct Registry {
    map: Arc<Mutex<HashMap<SubscriptionId, Arc<SubscriptionInfo>>>>,
}

impl Registry {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    /// Insert a fresh entry. The id is freshly generated, so absence is a
    /// precondition the caller already holds.
    pub(crate) fn insert(&self, id: SubscriptionId, info: SubscriptionInfo) {
        self.map.lock().insert(id, Arc::new(info));
    }

    /// Try to take exclusive use of a subscription's socket.
    pub(crate) fn checkout(&self, id: SubscriptionId) -> Checkout<'_> {
        let map = self.map.lock();
        match map.get(&id) {
            None => Checkout::NotFound,
            Some(info) if info.should_unsub.load(Ordering::Relaxed) => Checkout::Dying,
            Some(info) if info.in_use.load(Ordering::Relaxed) => Checkout::Busy,
            Some(info) => {
                info.in_use.store(true, Ordering::Relaxed);
                info.polled_recently.store(true, Ordering::Relaxed);
                Checkout::Ready(CheckedOut {
                    registry: self,
                    id,
                    info: Arc::clone(info),
                })
            }
        }
    }

    fn checkin(&self, info: &SubscriptionInfo) {
        let _guard = self.map.lock();
        info.polled_recently.store(true, Ordering::Relaxed);
        info.in_use.store(false, Ordering::Relaxed);
    }

    /// Whether a cooperative unsubscribe is pending for a checked-out entry.
    pub(crate) fn wants_unsub(&self, info: &SubscriptionInfo) -> bool {
        let _guard = self.map.lock();
        info.should_unsub.load(Ordering::Relaxed)
    }

    /// Cooperative unsubscribe: remove now if idle, defer to the active
    /// poll's next slice boundary otherwise.
    pub(crate) fn mark_unsub(&self, id: SubscriptionId) -> Unsub {
        let mut map = self.map.lock();
        let in_use = match map.get(&id) {
            None => return Unsub::NotFound,
            Some(info) => info.in_use.load(Ordering::Relaxed),
        };
        if in_use {
            if let Some(info) = map.get(&id) {
                info.should_unsub.store(true, Ordering::Relaxed);
            }
            Unsub::Deferred
        } else {
            if let Some(info) = map.remove(&id) {
                info.socket.close();
            }
            Unsub::Removed
        }
    }

    /// Unconditionally close and erase. Returns false for an unknown id.
    pub(crate) fn force_close_and_remove(&self, id: SubscriptionId) -> bool {
        match self.map.lock().remove(&id) {
            Some(info) => {
                info.socket.close();
                true
            }
            None => false,
        }
    }

    /// One reaper pass: clear every recently-polled flag, close and erase
    /// everything else. Two-pass so erasure never races the walk. Entries
    /// checked out by a live poll are left alone.
    pub(crate) fn sweep(&self) -> usize {
        let mut map = self.map.lock();
        let victims: Vec<SubscriptionId> = map
            .iter()
            .filter_map(|(id, info)| {
                if info.in_use.load(Ordering::Relaxed) {
                    return None;
                }
                if info.polled_recently.swap(false, Ordering::Relaxed) {
                    None
                } else {
                    Some(*id)
                }
            })
            .collect();

        for id in &victims {
            if let Some(info) = map.remove(id) {
                info.socket.close();
            }
        }
        victims.len()
    }

    /// Close and erase everything (plane shutdown).
    pub(crate) fn clear(&self) {
        let mut map = self.map.lock();
        for (_, info) in map.drain() {
            info.socket.close();
        }
    }

    #[cfg(test)]
    pub(crate) fn contains(&self, id: SubscriptionId) -> bool {
        self.map.lock().contains_key(&id)
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.map.lock().len()
    }
}
