//! Plane configuration.
//!
//! Recognized options for a process joining the messaging plane. The same
//! struct covers all three roles; `is_router` and `is_relay` select the
//! topology, everything else defaults to a standalone data node.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Longest a single poll may run, and the reaper interval.
pub const MAX_POLL_WINDOW: Duration = Duration::from_secs(10 * 60);

/// The window under `debug_timeout`, for fast tests.
pub const DEBUG_POLL_WINDOW: Duration = Duration::from_millis(100);

/// Plane configuration options.
///
/// # Examples
///
/// ```
/// use fanline::PlaneOptions;
///
/// let opts = PlaneOptions::default()
///     .with_router(true)
///     .with_relay_peers(vec!["relay-0:27019".into(), "relay-1:27019".into()]);
/// assert!(opts.is_router);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PlaneOptions {
    /// Master kill switch; when false every API call returns disabled.
    pub enabled: bool,

    /// Secondary kill switch for auto-published data change events.
    pub publish_data_events: bool,

    /// Router topology: egress pushes into the relay cluster.
    pub is_router: bool,

    /// Relay topology: ingress pulls router pushes and republishes.
    pub is_relay: bool,

    /// This process's configured port; relay and peer endpoints are derived
    /// from it by fixed offsets.
    pub port: u16,

    /// `host:port` of the other data nodes in this process's fleet.
    pub peers: Vec<String>,

    /// `host:port` of the relay cluster members.
    pub relay_peers: Vec<String>,

    /// Shrink the poll window and reaper interval to 100 ms for tests.
    pub debug_timeout: bool,
}

impl Default for PlaneOptions {
    fn default() -> Self {
        Self {
            enabled: true,
            publish_data_events: true,
            is_router: false,
            is_relay: false,
            port: 0,
            peers: Vec::new(),
            relay_peers: Vec::new(),
            debug_timeout: false,
        }
    }
}

impl PlaneOptions {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable or disable the plane entirely.
    #[must_use]
    pub fn with_enabled(mut self, enabled: bool) -> Self {
        self.enabled = enabled;
        self
    }

    /// Enable or disable auto-published data change events.
    #[must_use]
    pub fn with_publish_data_events(mut self, publish: bool) -> Self {
        self.publish_data_events = publish;
        self
    }

    /// Select the router topology.
    #[must_use]
    pub fn with_router(mut self, is_router: bool) -> Self {
        self.is_router = is_router;
        self
    }

    /// Select the relay topology.
    #[must_use]
    pub fn with_relay(mut self, is_relay: bool) -> Self {
        self.is_relay = is_relay;
        self
    }

    /// Set this process's configured port.
    #[must_use]
    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    /// Set the data-node peer list.
    #[must_use]
    pub fn with_peers(mut self, peers: Vec<String>) -> Self {
        self.peers = peers;
        self
    }

    /// Set the relay cluster members.
    #[must_use]
    pub fn with_relay_peers(mut self, relay_peers: Vec<String>) -> Self {
        self.relay_peers = relay_peers;
        self
    }

    /// Shrink the poll window and reaper interval for tests.
    #[must_use]
    pub fn with_debug_timeout(mut self, debug_timeout: bool) -> Self {
        self.debug_timeout = debug_timeout;
        self
    }

    /// The poll window and reaper interval this configuration selects.
    #[must_use]
    pub fn max_poll_window(&self) -> Duration {
        if self.debug_timeout {
            DEBUG_POLL_WINDOW
        } else {
            MAX_POLL_WINDOW
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_a_standalone_data_node() {
        let opts = PlaneOptions::default();
        assert!(opts.enabled);
        assert!(opts.publish_data_events);
        assert!(!opts.is_router);
        assert!(!opts.is_relay);
        assert!(opts.peers.is_empty());
        assert_eq!(opts.max_poll_window(), MAX_POLL_WINDOW);
    }

    #[test]
    fn builder_pattern() {
        let opts = PlaneOptions::new()
            .with_router(true)
            .with_relay_peers(vec!["relay-0:27019".into()])
            .with_debug_timeout(true);

        assert!(opts.is_router);
        assert_eq!(opts.relay_peers.len(), 1);
        assert_eq!(opts.max_poll_window(), DEBUG_POLL_WINDOW);
    }

    #[test]
    fn round_trips_through_serde() {
        let opts = PlaneOptions::new()
            .with_relay(true)
            .with_port(27019)
            .with_relay_peers(vec!["relay-1:27019".into()]);

        let json = serde_json::to_string(&opts).unwrap();
        let back: PlaneOptions = serde_json::from_str(&json).unwrap();
        assert!(back.is_relay);
        assert_eq!(back.port, 27019);
        assert_eq!(back.relay_peers, opts.relay_peers);
    }

    #[test]
    fn missing_fields_take_defaults() {
        let opts: PlaneOptions = serde_json::from_str(r#"{"is_router": true}"#).unwrap();
        assert!(opts.is_router);
        assert!(opts.enabled);
    }
}
