use std::sync::{
    atomic::{AtomicU64, Ordering},
    Arc,
};

/// Runtime metrics for a [`MulteeReader`](crate::MulteeReader).
///
/// A lightweight, read-only view exposing the number of live consumers.
/// Obtain a `Stats` handle via `MulteeReader::stats()`. Values use relaxed
/// atomics and are intended for diagnostics.
#[cfg_attr(docsrs, doc(cfg(feature = "stats")))]
#[derive(Debug, Clone)]
pub struct Stats {
    live_consumers: Arc<AtomicU64>,
}

impl Stats {
    // Create a new, empty stats instance.
    pub(crate) fn new() -> Self {
        Self {
            live_consumers: Arc::new(AtomicU64::new(0)),
        }
    }

    pub(crate) fn increment(&self) {
        self.live_consumers.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn decrement(&self) {
        self.live_consumers.fetch_sub(1, Ordering::Relaxed);
    }

    /// Returns the number of registered, not-yet-closed consumers of the
    /// associated `MulteeReader`.
    ///
    /// Consumers are counted from registration until they are closed or
    /// dropped; the hub handle itself is not a consumer.
    pub fn live_consumers(&self) -> u64 {
        self.live_consumers.load(Ordering::Relaxed)
    }
}
