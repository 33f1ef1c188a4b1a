// ── Reactive domain stores ──
//
// Independent, typed key-value caches with push-based change
// notification. Each `LiveSync` owns one `DataStore`; nothing here is
// process-global.

mod agent;
mod collection;
mod container;
mod pause;
mod selected;

use chrono::{DateTime, Utc};
use tokio::sync::watch;

pub use agent::AgentStore;
pub use collection::Record;
pub use container::ContainerStore;
pub use selected::SelectedContainer;

/// All domain stores of one sync session.
pub struct DataStore {
    pub containers: ContainerStore,
    pub agents: AgentStore,
    pub selected: SelectedContainer,
    last_snapshot: watch::Sender<Option<DateTime<Utc>>>,
    last_message: watch::Sender<Option<DateTime<Utc>>>,
}

impl DataStore {
    pub fn new() -> Self {
        let (last_snapshot, _) = watch::channel(None);
        let (last_message, _) = watch::channel(None);

        Self {
            containers: ContainerStore::new(),
            agents: AgentStore::new(),
            selected: SelectedContainer::new(),
            last_snapshot,
            last_message,
        }
    }

    /// When a REST snapshot (initial load or fallback poll) last landed.
    pub fn last_snapshot(&self) -> Option<DateTime<Utc>> {
        *self.last_snapshot.borrow()
    }

    /// When a pushed message was last applied.
    pub fn last_message(&self) -> Option<DateTime<Utc>> {
        *self.last_message.borrow()
    }

    pub fn subscribe_last_snapshot(&self) -> watch::Receiver<Option<DateTime<Utc>>> {
        self.last_snapshot.subscribe()
    }

    pub(crate) fn mark_snapshot(&self, at: DateTime<Utc>) {
        self.last_snapshot.send_replace(Some(at));
    }

    pub(crate) fn mark_message(&self, at: DateTime<Utc>) {
        self.last_message.send_replace(Some(at));
    }

    /// Empty every store and forget the timestamps.
    pub fn clear(&self) {
        self.containers.clear();
        self.agents.clear();
        self.selected.clear();
        self.last_snapshot.send_replace(None);
        self.last_message.send_replace(None);
    }
}

impl Default for DataStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::{AgentUpdate, ContainerUpdate, EntityId};

    #[test]
    fn stores_are_independent() {
        let store = DataStore::new();
        store.containers.upsert(ContainerUpdate::new(1));
        store.agents.upsert(AgentUpdate::new(1));
        store.selected.select(EntityId::from(1));

        store.agents.clear();
        assert_eq!(store.containers.len(), 1);
        assert_eq!(store.selected.selected_id(), Some(EntityId::from(1)));
    }

    #[test]
    fn clear_resets_timestamps() {
        let store = DataStore::new();
        store.mark_snapshot(Utc::now());
        store.mark_message(Utc::now());
        assert!(store.last_snapshot().is_some());

        store.clear();
        assert!(store.last_snapshot().is_none());
        assert!(store.last_message().is_none());
    }
}
