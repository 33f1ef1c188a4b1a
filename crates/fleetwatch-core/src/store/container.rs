// ── Container list store ──
//
// Live collection plus a pause gate. Writes always land in the live
// collection; reads and subscriptions go through the gate.

use std::sync::Arc;

use tokio::sync::watch;

use super::collection::EntityCollection;
use super::pause::PauseController;
use crate::model::{ContainerRecord, ContainerUpdate, EntityId};
use crate::stream::EntityStream;

/// Container list with pause/resume.
pub struct ContainerStore {
    live: EntityCollection<ContainerRecord>,
    gate: PauseController<ContainerRecord>,
}

impl ContainerStore {
    pub fn new() -> Self {
        Self {
            live: EntityCollection::new(),
            gate: PauseController::new(),
        }
    }

    // ── Mutations (always against live data) ────────────────────────

    /// Merge by `container_id` or append. Returns `true` if the key was new.
    pub fn upsert(&self, update: ContainerUpdate) -> bool {
        let is_new = self.live.upsert(update);
        self.forward();
        is_new
    }

    /// Upsert a batch in arrival order. Returns how many keys were new.
    pub fn upsert_many(&self, updates: Vec<ContainerUpdate>) -> usize {
        let added = self.live.upsert_many(updates);
        self.forward();
        added
    }

    /// Bulk replace, e.g. from the initial REST snapshot.
    pub fn set_all(&self, records: Vec<ContainerRecord>) {
        self.live.set_all(records);
        self.forward();
    }

    /// Merge a full snapshot and drop containers it no longer lists.
    /// Favorites on surviving containers are kept. Returns how many
    /// containers were dropped.
    pub fn apply_snapshot(&self, updates: Vec<ContainerUpdate>) -> usize {
        let pruned = self.live.apply_snapshot(updates);
        self.forward();
        pruned
    }

    /// Delete by key; no-op if absent.
    pub fn remove(&self, id: &EntityId) -> Option<Arc<ContainerRecord>> {
        let removed = self.live.remove(id);
        if removed.is_some() {
            self.forward();
        }
        removed
    }

    pub fn clear(&self) {
        self.live.clear();
        self.forward();
    }

    /// Set the client-local favorite flag. Returns `false` if unknown.
    pub fn set_favorite(&self, id: &EntityId, favorite: bool) -> bool {
        let found = self.live.modify(id, |c| c.is_favorite = favorite);
        if found {
            self.forward();
        }
        found
    }

    /// Flip the favorite flag, returning the new value.
    pub fn toggle_favorite(&self, id: &EntityId) -> Option<bool> {
        let mut flipped = None;
        self.live.modify(id, |c| {
            c.is_favorite = !c.is_favorite;
            flipped = Some(c.is_favorite);
        });
        if flipped.is_some() {
            self.forward();
        }
        flipped
    }

    // ── Pause ────────────────────────────────────────────────────────

    /// Freeze the visible list. Returns `false` if already paused.
    pub fn pause(&self) -> bool {
        self.gate.pause(|| self.live.snapshot())
    }

    /// Show current live data again. Returns `false` if not paused.
    pub fn resume(&self) -> bool {
        self.gate.resume(|| self.live.snapshot())
    }

    pub fn is_paused(&self) -> bool {
        self.gate.is_paused()
    }

    pub fn subscribe_paused(&self) -> watch::Receiver<bool> {
        self.gate.subscribe_paused()
    }

    // ── Reads (visible data) ─────────────────────────────────────────

    /// The visible list: the frozen copy while paused, live data otherwise.
    pub fn containers(&self) -> Arc<Vec<Arc<ContainerRecord>>> {
        self.gate.visible()
    }

    /// Visible record by key.
    pub fn get(&self, id: &EntityId) -> Option<Arc<ContainerRecord>> {
        if self.gate.is_paused() {
            self.gate
                .visible()
                .iter()
                .find(|c| c.container_id == *id)
                .cloned()
        } else {
            self.live.get(id)
        }
    }

    /// Number of visible records.
    pub fn len(&self) -> usize {
        self.gate.visible().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Stream of visible snapshots.
    pub fn subscribe(&self) -> EntityStream<ContainerRecord> {
        EntityStream::new(self.gate.subscribe())
    }

    // ── Live data (bypasses pause) ──────────────────────────────────

    pub fn live(&self) -> Arc<Vec<Arc<ContainerRecord>>> {
        self.live.snapshot()
    }

    pub fn live_len(&self) -> usize {
        self.live.len()
    }

    /// Mutation counter of the live collection.
    pub fn version(&self) -> u64 {
        self.live.version()
    }

    fn forward(&self) {
        self.gate.publish_live(|| self.live.snapshot());
    }
}

impl Default for ContainerStore {
    fn default() -> Self {
        Self::new()
    }
}
