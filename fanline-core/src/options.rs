//! Socket configuration options.
//!
//! These control queueing and reconnection behavior. The plane sets the high
//! water mark to 0 (unbounded) on every internal socket and leaves
//! backpressure to the callers.

use std::time::Duration;

/// Socket configuration options.
///
/// # Examples
///
/// ```
/// use fanline_core::options::SocketOptions;
/// use std::time::Duration;
///
/// let opts = SocketOptions::default()
///     .with_hwm(0)
///     .with_reconnect_ivl(Duration::from_millis(100));
/// ```
#[derive(Debug, Clone)]
pub struct SocketOptions {
    /// High water mark: maximum messages queued per peer.
    ///
    /// - `0`: unbounded
    /// - `n`: further messages to that peer are dropped while the queue is
    ///   full (lossy publish contract)
    pub hwm: usize,

    /// Initial reconnection delay after connection loss or refusal.
    pub reconnect_ivl: Duration,

    /// Maximum reconnection delay for exponential backoff.
    ///
    /// - Zero: no backoff, always use `reconnect_ivl`
    /// - Non-zero: doubles `reconnect_ivl` per attempt up to this value
    pub reconnect_ivl_max: Duration,
}

impl Default for SocketOptions {
    fn default() -> Self {
        Self {
            hwm: 1000,
            reconnect_ivl: Duration::from_millis(100),
            reconnect_ivl_max: Duration::from_secs(5),
        }
    }
}

impl SocketOptions {
    /// Create new socket options with default values.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the high water mark (0 = unbounded).
    #[must_use]
    pub fn with_hwm(mut self, hwm: usize) -> Self {
        self.hwm = hwm;
        self
    }

    /// Set the reconnection interval.
    #[must_use]
    pub fn with_reconnect_ivl(mut self, ivl: Duration) -> Self {
        self.reconnect_ivl = ivl;
        self
    }

    /// Set the maximum reconnection interval for exponential backoff.
    #[must_use]
    pub fn with_reconnect_ivl_max(mut self, max: Duration) -> Self {
        self.reconnect_ivl_max = max;
        self
    }

    /// Get the reconnection delay for the given attempt, with exponential
    /// backoff capped at `reconnect_ivl_max`.
    #[must_use]
    pub fn next_reconnect_ivl(&self, attempt: u32) -> Duration {
        if self.reconnect_ivl_max.is_zero() {
            return self.reconnect_ivl;
        }

        let backoff = self
            .reconnect_ivl
            .saturating_mul(2u32.saturating_pow(attempt));

        backoff.min(self.reconnect_ivl_max)
    }
}
