//! Socket context owning the in-process endpoint namespace.
//!
//! Every socket is created from a `Context`; inproc endpoint names only have
//! meaning within the context that issued them. Nothing here is a process
//! global, so tests can run several isolated planes side by side.

use dashmap::DashMap;
use std::sync::Arc;

use crate::hub::Hub;

/// Shared socket context.
///
/// Cheap to clone; all clones refer to the same endpoint namespace.
#[derive(Debug, Clone, Default)]
pub struct Context {
    inner: Arc<ContextInner>,
}

#[derive(Debug, Default)]
struct ContextInner {
    hubs: DashMap<String, Arc<Hub>>,
}

impl Context {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Get or create the hub for an inproc endpoint name.
    ///
    /// Creation on first touch is what makes connect-before-bind work: both
    /// sides meet at the same hub regardless of arrival order.
    pub(crate) fn hub(&self, name: &str) -> Arc<Hub> {
        self.inner
            .hubs
            .entry(name.to_string())
            .or_default()
            .clone()
    }

    /// List the inproc endpoint names currently known to this context.
    ///
    /// Primarily useful for debugging and tests.
    #[must_use]
    pub fn endpoints(&self) -> Vec<String> {
        self.inner.hubs.iter().map(|e| e.key().clone()).collect()
    }
}
