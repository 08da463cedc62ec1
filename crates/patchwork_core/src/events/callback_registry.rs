//! Observer list for project events.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use super::ProjectEvent;

/// A unique identifier for a subscription.
pub type SubscriptionId = u64;

/// Callback function type for project events.
///
/// Callbacks run on the thread that drives the project and should return quickly.
pub type EventCallback = Arc<dyn Fn(&ProjectEvent) + Send + Sync>;

/// Thread-safe registry of event observers.
///
/// # Example
///
/// ```ignore
/// use patchwork_core::events::{CallbackRegistry, ProjectEvent};
/// use std::sync::Arc;
///
/// let registry = CallbackRegistry::new();
/// let id = registry.subscribe(Arc::new(|event| println!("{}", event.name())));
/// registry.emit(&ProjectEvent::Started);
/// registry.unsubscribe(id);
/// ```
pub struct CallbackRegistry {
    callbacks: RwLock<HashMap<SubscriptionId, EventCallback>>,
    next_id: AtomicU64,
}

impl CallbackRegistry {
    /// Create a new empty callback registry.
    pub fn new() -> Self {
        Self {
            callbacks: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(1),
        }
    }

    /// Register an observer. Returns the id to unsubscribe with.
    pub fn subscribe(&self, callback: EventCallback) -> SubscriptionId {
        let id = self.next_id.fetch_add(1, Ordering::SeqCst);
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(id, callback);
        id
    }

    /// Remove an observer. Returns `true` if it was registered.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id)
            .is_some()
    }

    /// Deliver `event` to every observer, in subscription order.
    ///
    /// A panicking observer does not prevent delivery to the others.
    pub fn emit(&self, event: &ProjectEvent) {
        // Snapshot so observers may subscribe or unsubscribe while handling
        let mut callbacks: Vec<(SubscriptionId, EventCallback)> = self
            .callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(id, cb)| (*id, Arc::clone(cb)))
            .collect();
        callbacks.sort_by_key(|(id, _)| *id);

        for (id, callback) in callbacks {
            let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                callback(event);
            }));
            if result.is_err() {
                log::warn!("Observer {} panicked while handling {}", id, event.name());
            }
        }
    }

    /// Deliver a batch of events in order.
    pub fn emit_all(&self, events: &[ProjectEvent]) {
        for event in events {
            self.emit(event);
        }
    }

    /// Get the number of active subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.callbacks
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    /// Clear all subscriptions.
    pub fn clear(&self) {
        self.callbacks
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl Default for CallbackRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for CallbackRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CallbackRegistry")
            .field("subscriber_count", &self.subscriber_count())
            .field("next_id", &self.next_id.load(Ordering::SeqCst))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subscribe_and_emit() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        registry.subscribe(Arc::new(move |_event| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        }));

        registry.emit(&ProjectEvent::FilesChanged);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_unsubscribe() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        let counter_clone = Arc::clone(&counter);
        let id = registry.subscribe(Arc::new(move |_event| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        }));

        assert!(registry.unsubscribe(id));
        assert!(!registry.unsubscribe(id));
        registry.emit(&ProjectEvent::FilesChanged);

        assert_eq!(counter.load(Ordering::SeqCst), 0);
        assert_eq!(registry.subscriber_count(), 0);
    }

    #[test]
    fn test_emit_all_preserves_order() {
        let registry = CallbackRegistry::new();
        let seen = Arc::new(Mutex::new(Vec::new()));

        let seen_clone = Arc::clone(&seen);
        registry.subscribe(Arc::new(move |event| {
            seen_clone.lock().unwrap().push(event.name());
        }));

        registry.emit_all(&[
            ProjectEvent::file_changed("a.txt"),
            ProjectEvent::FilesChanged,
        ]);

        assert_eq!(*seen.lock().unwrap(), vec!["file_changed", "files_changed"]);
    }

    #[test]
    fn test_callback_panic_isolation() {
        let registry = CallbackRegistry::new();
        let counter = Arc::new(AtomicUsize::new(0));

        registry.subscribe(Arc::new(|_| {
            panic!("observer failure");
        }));

        let counter_clone = Arc::clone(&counter);
        registry.subscribe(Arc::new(move |_| {
            counter_clone.fetch_add(1, Ordering::SeqCst);
        }));

        registry.emit(&ProjectEvent::Started);
        assert_eq!(counter.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_observer_may_unsubscribe_during_emit() {
        let registry = Arc::new(CallbackRegistry::new());
        let registry_clone = Arc::clone(&registry);
        registry.subscribe(Arc::new(move |_| {
            registry_clone.clear();
        }));

        registry.emit(&ProjectEvent::Started);
        assert_eq!(registry.subscriber_count(), 0);
    }
}
