//! Typed observer registry.
//!
//! An [`EventBus`] keeps, per key, an ordered list of observers. Observers
//! registered with [`EventBus::once`] are removed after their first call. State
//! lives in the instance, so independent buses never see each other's
//! observers. The lifecycle publishes a [`LifecycleEvent`] for every phase it
//! enters; observers registered on a bus keyed by
//! [`Phase`](crate::lifecycle::Phase) are notified in registration order.

use crate::context::Transport;
use crate::ids::UnitId;
use crate::lifecycle::Phase;
use std::collections::HashMap;
use std::hash::Hash;
use std::panic::{self, AssertUnwindSafe};
use std::sync::{Arc, Mutex, PoisonError};
use tracing::error;

type Observer<E> = Arc<dyn Fn(&E) + Send + Sync>;

struct Entry<E> {
    observer: Observer<E>,
    once: bool,
}

/// Observer registry keyed by `K`, delivering events of type `E`.
pub struct EventBus<K, E> {
    entries: Mutex<HashMap<K, Vec<Entry<E>>>>,
}

impl<K, E> Default for EventBus<K, E> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
        }
    }
}

impl<K, E> std::fmt::Debug for EventBus<K, E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

impl<K: Eq + Hash + std::fmt::Debug, E> EventBus<K, E> {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn on<F>(&self, key: K, observer: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(key, Arc::new(observer), false);
    }

    pub fn once<F>(&self, key: K, observer: F)
    where
        F: Fn(&E) + Send + Sync + 'static,
    {
        self.register(key, Arc::new(observer), true);
    }

    fn register(&self, key: K, observer: Observer<E>, once: bool) {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(key)
            .or_default()
            .push(Entry { observer, once });
    }

    #[must_use]
    pub fn has_subscribers(&self, key: &K) -> bool {
        self.entries
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(key)
            .is_some_and(|list| !list.is_empty())
    }

    /// Notify every observer of `key` in registration order.
    ///
    /// Observers run outside the registry lock, so they may register further
    /// observers. A panicking observer is logged and does not stop the rest.
    ///
    /// # Returns
    ///
    /// The number of observers invoked.
    pub fn emit(&self, key: &K, event: &E) -> usize {
        let snapshot: Vec<Observer<E>> = {
            let mut entries = self.entries.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(list) = entries.get_mut(key) else {
                return 0;
            };
            let snapshot = list.iter().map(|e| Arc::clone(&e.observer)).collect();
            list.retain(|e| !e.once);
            snapshot
        };
        for observer in &snapshot {
            if panic::catch_unwind(AssertUnwindSafe(|| observer(event))).is_err() {
                error!(key = ?key, "Event observer panicked");
            }
        }
        snapshot.len()
    }
}

/// Published by the lifecycle when a unit enters a phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LifecycleEvent {
    pub unit_id: UnitId,
    pub phase: Phase,
    pub transport: Transport,
    pub route: Option<String>,
    pub status: u16,
}
