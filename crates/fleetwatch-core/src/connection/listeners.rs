// ── Typed listener registry ──
//
// Status and error broadcasting. Listeners run synchronously, in
// registration order, on whichever thread emits. Removal is idempotent and
// waits for an in-flight call of that listener.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::callback::CallbackSlot;

/// Handle returned by `on_status` / `on_error`, used to remove the listener.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

impl fmt::Display for ListenerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "listener-{}", self.0)
    }
}

/// Allocates listener ids shared by every `Listeners` of one manager, so a
/// single `remove_listener(id)` works regardless of the event type.
#[derive(Debug, Default)]
pub(crate) struct ListenerIds(AtomicU64);

impl ListenerIds {
    pub(crate) fn next(&self) -> ListenerId {
        ListenerId(self.0.fetch_add(1, Ordering::Relaxed) + 1)
    }
}

pub(crate) struct Listeners<E> {
    entries: Mutex<Vec<(ListenerId, Arc<CallbackSlot<E>>)>>,
}

impl<E> Default for Listeners<E> {
    fn default() -> Self {
        Self {
            entries: Mutex::new(Vec::new()),
        }
    }
}

impl<E> Listeners<E> {
    pub(crate) fn add(&self, id: ListenerId, f: impl FnMut(&E) + Send + 'static) {
        let slot = Arc::new(CallbackSlot::new(f));
        self.lock().push((id, slot));
    }

    /// Returns `true` if the id was registered here.
    pub(crate) fn remove(&self, id: ListenerId) -> bool {
        let removed = {
            let mut entries = self.lock();
            entries
                .iter()
                .position(|(existing, _)| *existing == id)
                .map(|pos| entries.remove(pos).1)
        };
        match removed {
            Some(slot) => {
                slot.close();
                true
            }
            None => false,
        }
    }

    /// Deliver `event` to every listener, in registration order.
    pub(crate) fn emit(&self, event: &E) {
        // Snapshot so listeners may add/remove listeners while we iterate.
        let slots: Vec<Arc<CallbackSlot<E>>> =
            self.lock().iter().map(|(_, slot)| Arc::clone(slot)).collect();
        for slot in slots {
            slot.invoke(event);
        }
    }

    pub(crate) fn len(&self) -> usize {
        self.lock().len()
    }

    pub(crate) fn clear(&self) {
        let drained: Vec<_> = self.lock().drain(..).collect();
        for (_, slot) in drained {
            slot.close();
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Vec<(ListenerId, Arc<CallbackSlot<E>>)>> {
        self.entries.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn delivers_in_registration_order() {
        let ids = ListenerIds::default();
        let listeners: Listeners<u32> = Listeners::default();
        let log = Arc::new(Mutex::new(Vec::new()));

        for tag in ["a", "b", "c"] {
            let log = Arc::clone(&log);
            listeners.add(ids.next(), move |n: &u32| log.lock().unwrap().push(format!("{tag}{n}")));
        }

        listeners.emit(&1);
        assert_eq!(*log.lock().unwrap(), vec!["a1", "b1", "c1"]);
    }

    #[test]
    fn remove_is_idempotent() {
        let ids = ListenerIds::default();
        let listeners: Listeners<()> = Listeners::default();
        let id = ids.next();
        listeners.add(id, |()| {});

        assert!(listeners.remove(id));
        assert!(!listeners.remove(id));
        assert_eq!(listeners.len(), 0);
    }

    #[test]
    fn removed_listener_is_not_called() {
        let ids = ListenerIds::default();
        let listeners: Listeners<()> = Listeners::default();
        let hits = Arc::new(AtomicU64::new(0));
        let counter = Arc::clone(&hits);
        let id = ids.next();
        listeners.add(id, move |()| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        listeners.emit(&());
        listeners.remove(id);
        listeners.emit(&());
        assert_eq!(hits.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn ids_are_unique() {
        let ids = ListenerIds::default();
        assert_ne!(ids.next(), ids.next());
    }
}
