use std::collections::HashSet;
use std::sync::Mutex;

pub type ProducerId = usize;

/// Element transported through the shared buffer.
///
/// The sentinel is a variant of its own rather than a reserved value, so no
/// produced datum can ever be mistaken for the shutdown signal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Item<T> {
    Data(T),
    Sentinel,
}

impl<T> Item<T> {
    pub fn is_sentinel(&self) -> bool {
        matches!(self, Item::Sentinel)
    }
}

/// Tracks the still-running producers and detects the last one to finish.
///
/// The active set lives under its own lock, a separate concern from the
/// buffer's mutex semaphore; the two are never held together.
#[derive(Debug, Default)]
pub struct ShutdownCoordinator {
    active: Mutex<HashSet<ProducerId>>,
}

impl ShutdownCoordinator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a producer to the active set.
    ///
    /// All registrations happen before any producer thread starts; calling
    /// this concurrently with [`finish`](ShutdownCoordinator::finish) could
    /// let an early finisher observe a transiently empty set.
    pub fn register(&self, id: ProducerId) {
        let mut active = self.active.lock().expect("coordinator state poisoned");
        let inserted = active.insert(id);
        debug_assert!(inserted, "producer {id} registered twice");
    }

    /// Removes a finished producer; returns true iff this call emptied the
    /// set. Exactly one caller sees true, however close together the
    /// producers finish, because check and removal share one lock hold.
    pub fn finish(&self, id: ProducerId) -> bool {
        let mut active = self.active.lock().expect("coordinator state poisoned");
        let removed = active.remove(&id);
        debug_assert!(removed, "producer {id} finished without registering");
        removed && active.is_empty()
    }

    /// Number of producers still running, for diagnostics.
    pub fn active(&self) -> usize {
        self.active.lock().expect("coordinator state poisoned").len()
    }
}
