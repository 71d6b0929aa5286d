//! Observers of replacement changes.
//!
//! An observer is any consumer outside the engine (a renderer, a UI layer)
//! that wants to hear when a composite's replacement list changes.

use std::sync::atomic::{AtomicU64, Ordering};

use super::ReplacementChange;
use crate::component::ComponentIdx;

/// Unique identifier for a subscription.
///
/// Returned by [`Engine::subscribe_replacements`](crate::Engine) and used to
/// unsubscribe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriberId(u64);

impl SubscriberId {
    /// Generate a new unique subscriber ID.
    ///
    /// Uses an atomic counter to ensure uniqueness across engines.
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for SubscriberId {
    fn default() -> Self {
        Self::new()
    }
}

type ReplacementCallback = Box<dyn Fn(ComponentIdx, &[ReplacementChange]) + Send + Sync>;

/// A callback registered for replacement changes.
struct Subscriber {
    id: SubscriberId,
    notify: ReplacementCallback,
}

/// The engine's set of replacement observers.
#[derive(Default)]
pub struct ReplacementObservers {
    subscribers: Vec<Subscriber>,
}

impl ReplacementObservers {
    pub fn subscribe<F>(&mut self, notify: F) -> SubscriberId
    where
        F: Fn(ComponentIdx, &[ReplacementChange]) + Send + Sync + 'static,
    {
        let id = SubscriberId::new();
        self.subscribers.push(Subscriber {
            id,
            notify: Box::new(notify),
        });
        id
    }

    /// Returns false if `id` was not subscribed.
    pub fn unsubscribe(&mut self, id: SubscriberId) -> bool {
        let before = self.subscribers.len();
        self.subscribers.retain(|s| s.id != id);
        self.subscribers.len() != before
    }

    pub fn notify(&self, composite: ComponentIdx, changes: &[ReplacementChange]) {
        if changes.is_empty() {
            return;
        }
        for subscriber in &self.subscribers {
            (subscriber.notify)(composite, changes);
        }
    }

    pub fn len(&self) -> usize {
        self.subscribers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.subscribers.is_empty()
    }
}

impl std::fmt::Debug for ReplacementObservers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReplacementObservers")
            .field("subscribers", &self.subscribers.len())
            .finish()
    }
}
