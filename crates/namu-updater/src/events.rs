//! In-process publish/subscribe for update events.
//!
//! Delivery is synchronous, on the publishing task, in subscription order.
//! Late subscribers do not see earlier events. A handler that panics is
//! logged and skipped; the remaining handlers still receive the event.

use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock};

use tracing::error;

use crate::applier::ApplyState;
use crate::candidate::UpdateCandidate;
use crate::version::Version;

/// Events published by the resolver, the push channel, and the applier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UpdateEvent {
    /// A candidate newer than the running build was found
    UpdateAvailable {
        candidate: UpdateCandidate,
        current_version: Version,
    },
    /// The applier moved to a new state
    ApplyStateChanged(ApplyState),
}

impl UpdateEvent {
    /// Short name for logs.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UpdateAvailable { .. } => "update-available",
            Self::ApplyStateChanged(_) => "apply-state-changed",
        }
    }
}

type Handler = Arc<dyn Fn(&UpdateEvent) + Send + Sync>;

/// Handle returned by [`EventBus::subscribe`].
///
/// Not `Clone`: releasing it through [`EventBus::unsubscribe`] consumes it.
#[derive(Debug, PartialEq, Eq, Hash)]
#[must_use = "a subscription must be released with EventBus::unsubscribe"]
pub struct Subscription {
    id: u64,
}

impl Subscription {
    pub fn id(&self) -> u64 {
        self.id
    }
}

/// Synchronous event bus.
pub struct EventBus {
    next_id: AtomicU64,
    handlers: RwLock<Vec<(u64, Handler)>>,
}

impl EventBus {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            handlers: RwLock::new(Vec::new()),
        }
    }

    /// Register a handler. It receives every event published afterwards.
    pub fn subscribe<F>(&self, handler: F) -> Subscription
    where
        F: Fn(&UpdateEvent) + Send + Sync + 'static,
    {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.handlers
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .push((id, Arc::new(handler)));
        Subscription { id }
    }

    /// Remove a handler. Returns false if it was already gone.
    pub fn unsubscribe(&self, subscription: Subscription) -> bool {
        let mut handlers = self.handlers.write().unwrap_or_else(|e| e.into_inner());
        let before = handlers.len();
        handlers.retain(|(id, _)| *id != subscription.id);
        handlers.len() != before
    }

    /// Deliver `event` to every current handler. Returns how many handlers
    /// completed without panicking.
    pub fn publish(&self, event: &UpdateEvent) -> usize {
        // Snapshot so handlers may subscribe or unsubscribe while we deliver.
        let snapshot: Vec<(u64, Handler)> = self
            .handlers
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone();

        let mut delivered = 0;
        for (id, handler) in snapshot {
            match catch_unwind(AssertUnwindSafe(|| handler(event))) {
                Ok(()) => delivered += 1,
                Err(panic) => {
                    let message = panic
                        .downcast_ref::<&str>()
                        .map(|s| s.to_string())
                        .or_else(|| panic.downcast_ref::<String>().cloned())
                        .unwrap_or_else(|| "unknown panic".to_string());
                    error!(
                        "Handler {} panicked on {} event: {}",
                        id,
                        event.kind(),
                        message
                    );
                }
            }
        }
        delivered
    }

    /// Number of registered handlers.
    pub fn listener_count(&self) -> usize {
        self.handlers.read().unwrap_or_else(|e| e.into_inner()).len()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}
