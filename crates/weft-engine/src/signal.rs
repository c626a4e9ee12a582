//! In-process signal observer registry.
//!
//! [`SignalHub`] is the seam between process signal delivery and the
//! orchestrator. The host forwards each received signal number to
//! [`deliver()`](SignalHub::deliver); every subscriber's callback runs
//! with that number. Tests drive shutdown by calling `deliver` directly.
//!
//! Callbacks run on the delivering thread, outside the registry lock,
//! so a callback may subscribe or unsubscribe without deadlocking.

use std::sync::Arc;

use indexmap::IndexMap;
use parking_lot::Mutex;
use tracing::debug;

/// Interactive interrupt (Ctrl-C).
pub const SIGINT: i32 = 2;
/// Termination request.
pub const SIGTERM: i32 = 15;

type SignalCallback = Arc<dyn Fn(i32) + Send + Sync>;

/// Handle returned by [`SignalHub::subscribe()`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Registry {
    next_id: u64,
    callbacks: IndexMap<u64, SignalCallback>,
}

/// Registry of signal observers. Cloning yields another handle to the
/// same registry.
#[derive(Clone, Default)]
pub struct SignalHub {
    registry: Arc<Mutex<Registry>>,
}

impl SignalHub {
    /// Create an empty hub.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `callback` to run on every delivered signal.
    pub fn subscribe<F>(&self, callback: F) -> SubscriptionId
    where
        F: Fn(i32) + Send + Sync + 'static,
    {
        let mut registry = self.registry.lock();
        let id = registry.next_id;
        registry.next_id += 1;
        registry.callbacks.insert(id, Arc::new(callback));
        SubscriptionId(id)
    }

    /// Remove a subscription. Returns `false` if it was already gone.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.registry.lock().callbacks.shift_remove(&id.0).is_some()
    }

    /// Deliver `signum` to every subscriber, in subscription order.
    ///
    /// Returns the number of callbacks invoked.
    pub fn deliver(&self, signum: i32) -> usize {
        let callbacks: Vec<SignalCallback> =
            self.registry.lock().callbacks.values().cloned().collect();
        debug!(signum, subscribers = callbacks.len(), "delivering signal");
        for callback in &callbacks {
            callback(signum);
        }
        callbacks.len()
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.registry.lock().callbacks.len()
    }
}

impl std::fmt::Debug for SignalHub {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SignalHub")
            .field("subscribers", &self.subscriber_count())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicI32, AtomicUsize, Ordering};

    #[test]
    fn deliver_reaches_every_subscriber() {
        let hub = SignalHub::new();
        let seen = Arc::new(AtomicI32::new(0));
        let calls = Arc::new(AtomicUsize::new(0));
        for _ in 0..3 {
            let seen = Arc::clone(&seen);
            let calls = Arc::clone(&calls);
            hub.subscribe(move |sig| {
                seen.store(sig, Ordering::SeqCst);
                calls.fetch_add(1, Ordering::SeqCst);
            });
        }
        assert_eq!(hub.deliver(SIGTERM), 3);
        assert_eq!(seen.load(Ordering::SeqCst), SIGTERM);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let hub = SignalHub::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let counted = Arc::clone(&calls);
        let id = hub.subscribe(move |_| {
            counted.fetch_add(1, Ordering::SeqCst);
        });
        assert!(hub.unsubscribe(id));
        assert!(!hub.unsubscribe(id));
        assert_eq!(hub.deliver(SIGINT), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 0);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn callback_may_unsubscribe_itself() {
        let hub = SignalHub::new();
        let slot: Arc<Mutex<Option<SubscriptionId>>> = Arc::new(Mutex::new(None));
        let inner_hub = hub.clone();
        let inner_slot = Arc::clone(&slot);
        let id = hub.subscribe(move |_| {
            if let Some(id) = inner_slot.lock().take() {
                inner_hub.unsubscribe(id);
            }
        });
        *slot.lock() = Some(id);
        assert_eq!(hub.deliver(SIGINT), 1);
        assert_eq!(hub.subscriber_count(), 0);
    }

    #[test]
    fn clones_share_the_registry() {
        let hub = SignalHub::new();
        let other = hub.clone();
        other.subscribe(|_| {});
        assert_eq!(hub.subscriber_count(), 1);
    }
}
