//! Change events and their subscribers.
//!
//! Every write that changes the store is published as a [`ChangeEvent`]
//! carrying the fully-qualified keys that changed. Delivery is synchronous on
//! the publishing thread.

use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use metrics::counter;
use time::OffsetDateTime;
use tracing::debug;
use uuid::Uuid;

use super::lock::mutex_lock;

const SOURCE: &str = "cache::events";

pub(crate) const METRIC_PUBLISH: &str = "gqlstore_publish_total";

/// Monotonic epoch for ordering events.
///
/// Each published event gets a unique, increasing epoch within its cache.
pub type Epoch = u64;

/// A set of changed keys, as delivered to subscribers.
#[derive(Debug, Clone)]
pub struct ChangeEvent {
    /// Unique identifier (UUIDv4).
    pub id: Uuid,
    /// Monotonic epoch for ordering within this cache.
    pub epoch: Epoch,
    /// `"<recordKey>.<fieldKey>"` for every field that changed.
    pub changed_keys: HashSet<String>,
    pub timestamp: OffsetDateTime,
}

impl ChangeEvent {
    pub fn new(changed_keys: HashSet<String>, epoch: Epoch) -> Self {
        Self {
            id: Uuid::new_v4(),
            epoch,
            changed_keys,
            timestamp: OffsetDateTime::now_utc(),
        }
    }

    /// Whether any changed key is in `dependent_keys`.
    pub fn touches(&self, dependent_keys: &HashSet<String>) -> bool {
        let (small, large) = if self.changed_keys.len() <= dependent_keys.len() {
            (&self.changed_keys, dependent_keys)
        } else {
            (dependent_keys, &self.changed_keys)
        };
        small.iter().any(|key| large.contains(key))
    }
}

/// Receives every published change; decides for itself whether it cares.
pub trait Subscriber: Send + Sync {
    fn on_change(&self, event: &ChangeEvent);
}

impl<F> Subscriber for F
where
    F: Fn(&ChangeEvent) + Send + Sync,
{
    fn on_change(&self, event: &ChangeEvent) {
        self(event)
    }
}

/// Registered subscribers, compared by `Arc` identity.
pub struct SubscriberList {
    subscribers: Mutex<Vec<Arc<dyn Subscriber>>>,
    epoch_counter: AtomicU64,
}

impl SubscriberList {
    pub fn new() -> Self {
        Self {
            subscribers: Mutex::new(Vec::new()),
            epoch_counter: AtomicU64::new(0),
        }
    }

    /// Get the next epoch number.
    pub fn next_epoch(&self) -> Epoch {
        self.epoch_counter.fetch_add(1, Ordering::SeqCst)
    }

    /// Register `subscriber`. Returns `false` if it was already registered.
    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> bool {
        let mut subscribers = mutex_lock(&self.subscribers, SOURCE, "subscribe");
        if subscribers
            .iter()
            .any(|existing| Arc::ptr_eq(existing, &subscriber))
        {
            return false;
        }
        subscribers.push(subscriber);
        true
    }

    /// Returns whether `subscriber` was registered.
    pub fn unsubscribe(&self, subscriber: &Arc<dyn Subscriber>) -> bool {
        let mut subscribers = mutex_lock(&self.subscribers, SOURCE, "unsubscribe");
        let before = subscribers.len();
        subscribers.retain(|existing| !Arc::ptr_eq(existing, subscriber));
        subscribers.len() != before
    }

    /// Deliver `changed_keys` to every subscriber registered right now.
    ///
    /// Nothing is delivered for an empty set. The list is snapshotted first,
    /// so subscribers may (un)subscribe from inside their callback.
    pub fn publish(&self, changed_keys: HashSet<String>) -> Option<ChangeEvent> {
        if changed_keys.is_empty() {
            return None;
        }
        let snapshot: Vec<Arc<dyn Subscriber>> =
            mutex_lock(&self.subscribers, SOURCE, "publish").clone();
        let event = ChangeEvent::new(changed_keys, self.next_epoch());

        debug!(
            event_id = %event.id,
            event_epoch = event.epoch,
            changed = event.changed_keys.len(),
            subscribers = snapshot.len(),
            "Publishing cache change"
        );
        counter!(METRIC_PUBLISH).increment(1);

        for subscriber in &snapshot {
            subscriber.on_change(&event);
        }
        Some(event)
    }

    pub fn len(&self) -> usize {
        mutex_lock(&self.subscribers, SOURCE, "len").len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for SubscriberList {
    fn default() -> Self {
        Self::new()
    }
}
