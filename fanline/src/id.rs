//! Subscription handles.
//!
//! A `SubscriptionId` is the opaque 96-bit cursor a client polls on: 4 bytes
//! of big-endian seconds, 5 bytes unique to this process, and a 3-byte
//! wrapping counter seeded randomly. Byte order gives the total order the
//! poll output relies on, and sequential ids from one process sort in
//! generation order.

use once_cell::sync::Lazy;
use rand::Rng;
use std::fmt;
use std::str::FromStr;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};
use thiserror::Error;

static PROCESS_UNIQUE: Lazy<[u8; 5]> = Lazy::new(|| rand::thread_rng().gen());
static COUNTER: Lazy<AtomicU32> = Lazy::new(|| AtomicU32::new(rand::thread_rng().gen()));

/// Opaque ordered handle for one subscription.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId([u8; 12]);

impl SubscriptionId {
    /// Generate a fresh id, unique within this process's lifetime.
    #[must_use]
    pub fn generate() -> Self {
        let seconds = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs() as u32)
            .unwrap_or_default();
        let count = COUNTER.fetch_add(1, Ordering::SeqCst).to_be_bytes();

        let mut bytes = [0u8; 12];
        bytes[0..4].copy_from_slice(&seconds.to_be_bytes());
        bytes[4..9].copy_from_slice(&*PROCESS_UNIQUE);
        bytes[9..12].copy_from_slice(&count[1..4]);
        Self(bytes)
    }

    #[must_use]
    pub const fn from_bytes(bytes: [u8; 12]) -> Self {
        Self(bytes)
    }

    #[must_use]
    pub const fn into_bytes(self) -> [u8; 12] {
        self.0
    }
}

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl fmt::Debug for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SubscriptionId({})", self)
    }
}

/// A string that was not 24 hex digits.
#[derive(Debug, Error)]
#[error("invalid subscription id: {0}")]
pub struct ParseIdError(String);

impl FromStr for SubscriptionId {
    type Err = ParseIdError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let raw = hex::decode(s).map_err(|_| ParseIdError(s.to_string()))?;
        let bytes: [u8; 12] = raw
            .try_into()
            .map_err(|_| ParseIdError(s.to_string()))?;
        Ok(Self(bytes))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashSet;

    #[test]
    fn ids_are_unique() {
        let ids: HashSet<SubscriptionId> = (0..1000).map(|_| SubscriptionId::generate()).collect();
        assert_eq!(ids.len(), 1000);
    }

    #[test]
    fn byte_order_is_the_total_order() {
        let low = SubscriptionId::from_bytes([0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 1]);
        let high = SubscriptionId::from_bytes([0, 0, 0, 1, 0, 0, 0, 0, 0, 0, 0, 2]);
        let later = SubscriptionId::from_bytes([0, 0, 0, 2, 0, 0, 0, 0, 0, 0, 0, 0]);
        assert!(low < high);
        assert!(high < later);
    }

    #[test]
    fn display_round_trips() {
        let id = SubscriptionId::generate();
        let text = id.to_string();
        assert_eq!(text.len(), 24);
        let back: SubscriptionId = text.parse().unwrap();
        assert_eq!(back, id);
    }

    #[test]
    fn parse_rejects_bad_input() {
        assert!("not-hex".parse::<SubscriptionId>().is_err());
        assert!("abcd".parse::<SubscriptionId>().is_err());
    }
}
