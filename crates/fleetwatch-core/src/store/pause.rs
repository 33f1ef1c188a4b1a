// ── Pause / snapshot controller ──
//
// Sits between a live collection and its readers. While live, every
// publish forwards the collection's latest snapshot; while paused, readers
// keep seeing a deep copy taken at the pause instant.

use std::sync::{Arc, Mutex, PoisonError};

use tokio::sync::watch;
use tracing::debug;

use crate::stream::Snapshot;

/// `Live` / `Paused` gate over one collection's visible snapshot.
pub(crate) struct PauseController<T> {
    /// `Some` while paused.
    frozen: Mutex<Option<Snapshot<T>>>,
    visible: watch::Sender<Snapshot<T>>,
    paused: watch::Sender<bool>,
}

impl<T: Clone + Send + Sync + 'static> PauseController<T> {
    pub(crate) fn new() -> Self {
        let (visible, _) = watch::channel(Arc::new(Vec::new()));
        let (paused, _) = watch::channel(false);
        Self {
            frozen: Mutex::new(None),
            visible,
            paused,
        }
    }

    /// Freeze the view on a deep copy of `live()`. Returns `false` if
    /// already paused.
    pub(crate) fn pause(&self, live: impl FnOnce() -> Snapshot<T>) -> bool {
        let mut frozen = self.lock();
        if frozen.is_some() {
            return false;
        }

        let copy: Snapshot<T> = Arc::new(live().iter().map(|r| Arc::new(T::clone(r))).collect());
        debug!(records = copy.len(), "pausing live view");
        *frozen = Some(Arc::clone(&copy));
        self.visible.send_replace(copy);
        self.paused.send_replace(true);
        true
    }

    /// Drop the frozen copy and show `live()`. Returns `false` if not paused.
    pub(crate) fn resume(&self, live: impl FnOnce() -> Snapshot<T>) -> bool {
        let mut frozen = self.lock();
        if frozen.take().is_none() {
            return false;
        }

        let current = live();
        debug!(records = current.len(), "resuming live view");
        self.visible.send_replace(current);
        self.paused.send_replace(false);
        true
    }

    /// Forward the latest live snapshot unless paused.
    ///
    /// `live` is read under the controller lock, so concurrent publishers
    /// can never leave an older snapshot visible after a newer one.
    pub(crate) fn publish_live(&self, live: impl FnOnce() -> Snapshot<T>) {
        let frozen = self.lock();
        if frozen.is_none() {
            self.visible.send_replace(live());
        }
    }

    pub(crate) fn visible(&self) -> Snapshot<T> {
        self.visible.borrow().clone()
    }

    pub(crate) fn is_paused(&self) -> bool {
        *self.paused.borrow()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Snapshot<T>> {
        self.visible.subscribe()
    }

    pub(crate) fn subscribe_paused(&self) -> watch::Receiver<bool> {
        self.paused.subscribe()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Option<Snapshot<T>>> {
        self.frozen.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    fn snap(values: &[u32]) -> Snapshot<u32> {
        Arc::new(values.iter().copied().map(Arc::new).collect())
    }

    fn plain(s: &Snapshot<u32>) -> Vec<u32> {
        s.iter().map(|v| **v).collect()
    }

    #[test]
    fn paused_view_ignores_live_publishes() {
        let ctl = PauseController::new();
        ctl.publish_live(|| snap(&[1, 2]));

        assert!(ctl.pause(|| snap(&[1, 2])));
        ctl.publish_live(|| snap(&[1, 2, 3]));
        assert_eq!(plain(&ctl.visible()), vec![1, 2]);

        assert!(ctl.resume(|| snap(&[1, 2, 3])));
        assert_eq!(plain(&ctl.visible()), vec![1, 2, 3]);
    }

    #[test]
    fn frozen_copy_does_not_alias_live_records() {
        let ctl = PauseController::new();
        let live = snap(&[1]);
        ctl.pause(|| Arc::clone(&live));
        assert!(!Arc::ptr_eq(&ctl.visible()[0], &live[0]));
    }

    #[test]
    fn double_pause_and_resume_are_no_ops() {
        let ctl = PauseController::<u32>::new();
        assert!(!ctl.resume(|| snap(&[])));
        assert!(ctl.pause(|| snap(&[4])));
        assert!(!ctl.pause(|| snap(&[5])));
        assert_eq!(plain(&ctl.visible()), vec![4]);
        assert!(ctl.is_paused());
    }

    #[test]
    fn paused_flag_is_observable() {
        let ctl = PauseController::<u32>::new();
        let mut rx = ctl.subscribe_paused();
        ctl.pause(|| snap(&[]));
        assert!(rx.has_changed().unwrap());
        assert!(*rx.borrow_and_update());
    }
}
