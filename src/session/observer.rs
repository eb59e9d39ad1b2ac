//! Observer registry for telemetry update notifications.
//!
//! Observers are zero-argument callbacks run by the ingestion loop, on a
//! blocking-pool thread, after a sample has been logged and stored. They receive no data: they read the
//! latest snapshot from the session, which may already be ahead of the sample
//! that triggered the call.
//!
//! Presentation code living on another thread should use
//! [`ObserverRegistry::subscribe`], which hands one notice per sample over a
//! channel in arrival order.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::{debug, error};

/// Registered callback; returns `false` once it should be dropped
type Entry = Arc<dyn Fn() -> bool + Send + Sync>;

/// Thread-safe list of observers, cheap to clone.
#[derive(Clone, Default)]
pub struct ObserverRegistry {
    observers: Arc<RwLock<Vec<Entry>>>,
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}

impl ObserverRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a callback
    pub fn register<F>(&self, callback: F)
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.push(Arc::new(move || {
            callback();
            true
        }));
    }

    /// Register a channel-backed observer.
    ///
    /// Each update sends a sequence number (starting at 1) counting the
    /// notifications delivered to this subscriber. Nothing is coalesced.
    /// The observer is removed on the first update after the receiver is
    /// dropped.
    pub fn subscribe(&self) -> mpsc::UnboundedReceiver<u64> {
        let (tx, rx) = mpsc::unbounded_channel();
        let sequence = AtomicU64::new(0);
        self.push(Arc::new(move || {
            let n = sequence.fetch_add(1, Ordering::Relaxed) + 1;
            tx.send(n).is_ok()
        }));
        rx
    }

    fn push(&self, entry: Entry) {
        self.observers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(entry);
    }

    pub fn len(&self) -> usize {
        self.observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Invoke every observer in registration order.
    ///
    /// A panicking observer is logged and does not affect the others.
    /// Subscriptions whose receiver is gone are removed.
    pub fn notify_all(&self) {
        // Copy so observers may register further observers
        let observers: Vec<Entry> = self
            .observers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();

        let mut closed = Vec::new();
        for (index, observer) in observers.iter().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| observer())) {
                Ok(true) => {}
                Ok(false) => closed.push(observer.clone()),
                Err(_) => error!("Telemetry observer #{} panicked", index),
            }
        }

        if !closed.is_empty() {
            debug!("Removing {} closed subscription(s)", closed.len());
            self.observers
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .retain(|entry| !closed.iter().any(|c| Arc::ptr_eq(c, entry)));
        }
    }
}
