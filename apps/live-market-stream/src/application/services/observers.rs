//! State Observers
//!
//! Synchronous callbacks registered on a subscription. Registration
//! returns an [`ObserverHandle`]; dropping the handle does not unregister.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use parking_lot::Mutex;

use crate::domain::market::StreamState;

/// Callback invoked with every published state.
pub type StateObserver = Arc<dyn Fn(&StreamState) + Send + Sync>;

/// Ordered set of observers for one subscription.
#[derive(Default)]
pub(crate) struct ObserverRegistry {
    next_id: AtomicU64,
    observers: Mutex<Vec<(u64, StateObserver)>>,
}

impl ObserverRegistry {
    pub(crate) fn register(self: &Arc<Self>, observer: StateObserver) -> ObserverHandle {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.observers.lock().push((id, observer));
        ObserverHandle {
            registry: Arc::downgrade(self),
            id,
        }
    }

    /// Copy of the current observers, in registration order. Callers invoke
    /// them without holding the registry lock.
    pub(crate) fn snapshot(&self) -> Vec<StateObserver> {
        self.observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect()
    }

    pub(crate) fn clear(&self) {
        self.observers.lock().clear();
    }

    pub(crate) fn len(&self) -> usize {
        self.observers.lock().len()
    }

    fn remove(&self, id: u64) -> bool {
        let mut observers = self.observers.lock();
        let before = observers.len();
        observers.retain(|(existing, _)| *existing != id);
        observers.len() != before
    }

    fn contains(&self, id: u64) -> bool {
        self.observers.lock().iter().any(|(existing, _)| *existing == id)
    }
}

/// Handle to one registered observer.
#[derive(Debug, Clone)]
pub struct ObserverHandle {
    registry: Weak<ObserverRegistry>,
    id: u64,
}

impl ObserverHandle {
    /// Remove the observer. Returns false if it was already gone.
    pub fn unregister(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.remove(self.id))
    }

    /// Whether the observer will still be called.
    #[must_use]
    pub fn is_registered(&self) -> bool {
        self.registry
            .upgrade()
            .is_some_and(|registry| registry.contains(self.id))
    }
}

impl std::fmt::Debug for ObserverRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObserverRegistry")
            .field("observers", &self.len())
            .finish()
    }
}
