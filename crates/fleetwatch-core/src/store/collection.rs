// ── Generic reactive entity collection ──
//
// Insertion-ordered keyed storage with push-based change notification via
// `watch` channels. Records are stored behind `Arc`; merges go through
// `Arc::make_mut`, so a snapshot handed out earlier is never mutated.

use std::fmt;
use std::hash::Hash;
use std::sync::{Arc, PoisonError, RwLock};

use indexmap::IndexMap;
use tokio::sync::watch;

use crate::model::{AgentRecord, AgentUpdate, ContainerRecord, ContainerUpdate, EntityId};

/// A keyed entity that can absorb partial updates.
pub trait Record: Clone + Send + Sync + 'static {
    type Key: Clone + Eq + Hash + fmt::Debug + fmt::Display + Send + Sync + 'static;
    type Update: Send + 'static;

    fn key(&self) -> &Self::Key;
    fn update_key(update: &Self::Update) -> &Self::Key;
    fn from_update(update: Self::Update) -> Self;
    fn merge(&mut self, update: Self::Update);
}

impl Record for ContainerRecord {
    type Key = EntityId;
    type Update = ContainerUpdate;

    fn key(&self) -> &EntityId {
        &self.container_id
    }

    fn update_key(update: &ContainerUpdate) -> &EntityId {
        &update.container_id
    }

    fn from_update(update: ContainerUpdate) -> Self {
        ContainerRecord::from_update(update)
    }

    fn merge(&mut self, update: ContainerUpdate) {
        ContainerRecord::merge(self, update);
    }
}

impl Record for AgentRecord {
    type Key = EntityId;
    type Update = AgentUpdate;

    fn key(&self) -> &EntityId {
        &self.agent_id
    }

    fn update_key(update: &AgentUpdate) -> &EntityId {
        &update.agent_id
    }

    fn from_update(update: AgentUpdate) -> Self {
        AgentRecord::from_update(update)
    }

    fn merge(&mut self, update: AgentUpdate) {
        AgentRecord::merge(self, update);
    }
}

/// Reactive, insertion-ordered collection for one entity type.
///
/// Every mutation bumps a version counter and rebuilds the snapshot that
/// subscribers receive, while still holding the write lock, so snapshots
/// are published in mutation order.
pub(crate) struct EntityCollection<T: Record> {
    items: RwLock<IndexMap<T::Key, Arc<T>>>,

    /// Version counter, bumped on every mutation.
    version: watch::Sender<u64>,

    /// Full snapshot, rebuilt on mutation for cheap subscription.
    snapshot: watch::Sender<Arc<Vec<Arc<T>>>>,
}

impl<T: Record> EntityCollection<T> {
    pub(crate) fn new() -> Self {
        let (version, _) = watch::channel(0u64);
        let (snapshot, _) = watch::channel(Arc::new(Vec::new()));

        Self {
            items: RwLock::new(IndexMap::new()),
            version,
            snapshot,
        }
    }

    /// Merge by key, or append. Returns `true` if the key was new.
    pub(crate) fn upsert(&self, update: T::Update) -> bool {
        self.mutate(|items| Self::upsert_locked(items, update))
    }

    /// Upsert a batch in order, publishing one snapshot. Returns how many
    /// keys were new.
    pub(crate) fn upsert_many(&self, updates: Vec<T::Update>) -> usize {
        self.mutate(|items| {
            updates
                .into_iter()
                .map(|update| Self::upsert_locked(items, update))
                .filter(|is_new| *is_new)
                .count()
        })
    }

    /// Replace everything with `records`, in the given order.
    pub(crate) fn set_all(&self, records: Vec<T>) {
        self.mutate(|items| {
            items.clear();
            for record in records {
                items.insert(record.key().clone(), Arc::new(record));
            }
        });
    }

    /// Merge every update and drop keys the snapshot no longer contains.
    ///
    /// Unlike `set_all`, fields the snapshot does not carry (client-local
    /// flags) survive on records that are still present.
    pub(crate) fn apply_snapshot(&self, updates: Vec<T::Update>) -> usize {
        self.mutate(|items| {
            let mut seen = std::collections::HashSet::with_capacity(updates.len());
            for update in updates {
                seen.insert(T::update_key(&update).clone());
                Self::upsert_locked(items, update);
            }
            let before = items.len();
            items.retain(|key, _| seen.contains(key));
            before - items.len()
        })
    }

    /// Remove by key. Returns the removed record if it existed.
    pub(crate) fn remove(&self, key: &T::Key) -> Option<Arc<T>> {
        let mut items = self.write();
        let removed = items.shift_remove(key);
        if removed.is_some() {
            self.publish(&items);
        }
        removed
    }

    /// Apply `f` to one record in place. Returns `false` if absent.
    pub(crate) fn modify(&self, key: &T::Key, f: impl FnOnce(&mut T)) -> bool {
        let mut items = self.write();
        let Some(record) = items.get_mut(key) else {
            return false;
        };
        f(Arc::make_mut(record));
        self.publish(&items);
        true
    }

    pub(crate) fn clear(&self) {
        self.mutate(IndexMap::clear);
    }

    pub(crate) fn get(&self, key: &T::Key) -> Option<Arc<T>> {
        self.read().get(key).cloned()
    }

    /// Current snapshot (cheap `Arc` clone).
    pub(crate) fn snapshot(&self) -> Arc<Vec<Arc<T>>> {
        self.snapshot.borrow().clone()
    }

    pub(crate) fn subscribe(&self) -> watch::Receiver<Arc<Vec<Arc<T>>>> {
        self.snapshot.subscribe()
    }

    pub(crate) fn version(&self) -> u64 {
        *self.version.borrow()
    }

    pub(crate) fn len(&self) -> usize {
        self.read().len()
    }

    pub(crate) fn is_empty(&self) -> bool {
        self.read().is_empty()
    }

    pub(crate) fn keys(&self) -> Vec<T::Key> {
        self.read().keys().cloned().collect()
    }

    // ── Private helpers ──────────────────────────────────────────────

    fn upsert_locked(items: &mut IndexMap<T::Key, Arc<T>>, update: T::Update) -> bool {
        match items.get_mut(T::update_key(&update)) {
            Some(existing) => {
                Arc::make_mut(existing).merge(update);
                false
            }
            None => {
                let record = T::from_update(update);
                items.insert(record.key().clone(), Arc::new(record));
                true
            }
        }
    }

    fn mutate<R>(&self, f: impl FnOnce(&mut IndexMap<T::Key, Arc<T>>) -> R) -> R {
        let mut items = self.write();
        let result = f(&mut items);
        self.publish(&items);
        result
    }

    /// Rebuild the snapshot and broadcast it. Caller holds the write lock.
    fn publish(&self, items: &IndexMap<T::Key, Arc<T>>) {
        let values: Vec<Arc<T>> = items.values().cloned().collect();
        // `send_modify` updates unconditionally, even with zero receivers.
        self.snapshot.send_modify(|snap| *snap = Arc::new(values));
        self.version.send_modify(|v| *v += 1);
    }

    fn read(&self) -> std::sync::RwLockReadGuard<'_, IndexMap<T::Key, Arc<T>>> {
        self.items.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> std::sync::RwLockWriteGuard<'_, IndexMap<T::Key, Arc<T>>> {
        self.items.write().unwrap_or_else(PoisonError::into_inner)
    }
}
