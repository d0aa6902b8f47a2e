//! Change-notification bus.
//!
//! The core emits named change events so presentation layers can invalidate
//! cached reads. The core never depends on any subscriber: callbacks are
//! fire-and-forget and must not block.
//!
//! Events are collected inside a storage transaction and published only
//! after the transaction commits, so subscribers never observe state that
//! was rolled back.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::RwLock;

use crate::storage::types::{BlobId, IndexId, RepositoryId};

/// A named change to one of the persisted object stores.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord)]
pub enum ChangeEvent {
    /// A repository record changed (added, removed, or flags updated).
    Repository(RepositoryId),
    /// A file index changed.
    FileIndex {
        repository: RepositoryId,
        index: IndexId,
    },
    /// Blob content or its ref-count changed.
    Blob(BlobId),
}

type Callback = Arc<dyn Fn(&ChangeEvent) + Send + Sync>;

/// Subscription handle that unsubscribes automatically when dropped.
///
/// Hold this value to keep receiving events; drop it to unsubscribe.
pub struct Subscription {
    bus: Weak<EventBus>,
    id: usize,
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(bus) = self.bus.upgrade() {
            bus.unsubscribe(self.id);
        }
    }
}

/// Event bus publishing change events to subscribers.
///
/// Thread-safe; wrap in `Arc` to enable subscriptions.
pub struct EventBus {
    callbacks: RwLock<Vec<(usize, Callback)>>,
    next_id: AtomicUsize,
}

impl Default for EventBus {
    fn default() -> Self {
        Self {
            callbacks: RwLock::new(Vec::new()),
            next_id: AtomicUsize::new(0),
        }
    }
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to all change events.
    pub fn subscribe(
        self: &Arc<Self>,
        callback: impl Fn(&ChangeEvent) + Send + Sync + 'static,
    ) -> Subscription {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.callbacks.write().push((id, Arc::new(callback)));
        Subscription {
            bus: Arc::downgrade(self),
            id,
        }
    }

    /// Publish one event to every current subscriber.
    pub fn emit(&self, event: &ChangeEvent) {
        // clone callbacks out so a subscriber may itself subscribe/unsubscribe
        let callbacks: Vec<Callback> = self
            .callbacks
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for callback in callbacks {
            callback(event);
        }
    }

    /// Number of live subscriptions.
    pub fn subscriber_count(&self) -> usize {
        self.callbacks.read().len()
    }

    fn unsubscribe(&self, id: usize) {
        self.callbacks.write().retain(|(cb_id, _)| *cb_id != id);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_subscribe_and_emit() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(AtomicUsize::new(0));

        let seen_clone = Arc::clone(&seen);
        let _sub = bus.subscribe(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        bus.emit(&ChangeEvent::Repository(RepositoryId::new("notes")));
        bus.emit(&ChangeEvent::Blob(BlobId::temporary()));

        assert_eq!(seen.load(Ordering::SeqCst), 2);
    }

    #[test]
    fn test_drop_unsubscribes() {
        let bus = Arc::new(EventBus::new());
        let seen = Arc::new(AtomicUsize::new(0));

        let seen_clone = Arc::clone(&seen);
        let sub = bus.subscribe(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });
        assert_eq!(bus.subscriber_count(), 1);

        drop(sub);
        assert_eq!(bus.subscriber_count(), 0);

        bus.emit(&ChangeEvent::Repository(RepositoryId::new("notes")));
        assert_eq!(seen.load(Ordering::SeqCst), 0);
    }
}
