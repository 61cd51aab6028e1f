//! Cache invalidation protocol between nodes and the graphs that cache
//! results derived from them.
//!
//! A node keeps a list of non-owning handles to its observers. Every mutation
//! of the node reports a [`Change`] to each live observer; dead handles are
//! pruned on the way. Observers never own nodes through this list, so a graph
//! and its members do not form reference cycles.

use std::rc::{Rc, Weak};
use std::sync::atomic::{AtomicU64, Ordering};

/// Unique identifier for an observer registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObserverId(u64);

impl ObserverId {
    /// Generate a new unique observer ID.
    #[must_use]
    pub fn new() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(0);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

impl Default for ObserverId {
    fn default() -> Self {
        Self::new()
    }
}

/// What kind of node mutation happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Change {
    /// A relation was added, removed, or had its attributes changed.
    Structure,
    /// Tags, duration, or status changed.
    Metadata,
}

impl Change {
    /// Whether results that depend only on edges (orderings) are affected.
    #[must_use]
    pub const fn affects_structure(self) -> bool {
        matches!(self, Self::Structure)
    }
}

/// Anything that memoizes results derived from nodes.
pub trait CacheObserver {
    /// Drop whatever cached state `change` makes stale.
    fn invalidate(&self, change: Change);
}

/// The observer list held by each node.
#[derive(Default)]
pub struct Observers {
    entries: Vec<(ObserverId, Weak<dyn CacheObserver>)>,
}

impl Observers {
    /// Register `observer` under `id`, replacing an earlier registration with
    /// the same id.
    pub fn register(&mut self, id: ObserverId, observer: Weak<dyn CacheObserver>) {
        if let Some(slot) = self.entries.iter_mut().find(|(existing, _)| *existing == id) {
            slot.1 = observer;
        } else {
            self.entries.push((id, observer));
        }
    }

    /// Remove the registration for `id`. Returns `true` if one existed.
    pub fn unregister(&mut self, id: ObserverId) -> bool {
        let before = self.entries.len();
        self.entries.retain(|(existing, _)| *existing != id);
        self.entries.len() != before
    }

    /// Whether `id` is currently registered.
    #[must_use]
    pub fn contains(&self, id: ObserverId) -> bool {
        self.entries.iter().any(|(existing, _)| *existing == id)
    }

    /// Number of live observers.
    #[must_use]
    pub fn live_count(&self) -> usize {
        self.entries
            .iter()
            .filter(|(_, observer)| observer.strong_count() > 0)
            .count()
    }

    /// Upgrade every live observer, pruning dead handles.
    ///
    /// Callers release their borrow of the node before notifying, so an
    /// observer may freely read the node from inside `invalidate`.
    pub fn live(&mut self) -> Vec<Rc<dyn CacheObserver>> {
        let mut live = Vec::with_capacity(self.entries.len());
        self.entries.retain(|(_, observer)| match observer.upgrade() {
            Some(strong) => {
                live.push(strong);
                true
            }
            None => false,
        });
        live
    }
}

impl std::fmt::Debug for Observers {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|(id, _)| id))
            .finish()
    }
}

/// Deliver `change` to every observer in `observers`.
pub(crate) fn notify(observers: Vec<Rc<dyn CacheObserver>>, change: Change) {
    for observer in observers {
        observer.invalidate(change);
    }
}
