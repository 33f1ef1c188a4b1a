// ── Agent list store ──

use std::sync::Arc;

use super::collection::EntityCollection;
use crate::model::{AgentRecord, AgentUpdate, EntityId};
use crate::stream::EntityStream;

/// Agent list. Same merge rules as the container store, without pause.
pub struct AgentStore {
    agents: EntityCollection<AgentRecord>,
}

impl AgentStore {
    pub fn new() -> Self {
        Self {
            agents: EntityCollection::new(),
        }
    }

    pub fn upsert(&self, update: AgentUpdate) -> bool {
        self.agents.upsert(update)
    }

    pub fn upsert_many(&self, updates: Vec<AgentUpdate>) -> usize {
        self.agents.upsert_many(updates)
    }

    pub fn set_all(&self, records: Vec<AgentRecord>) {
        self.agents.set_all(records);
    }

    pub fn apply_snapshot(&self, updates: Vec<AgentUpdate>) -> usize {
        self.agents.apply_snapshot(updates)
    }

    pub fn remove(&self, id: &EntityId) -> Option<Arc<AgentRecord>> {
        self.agents.remove(id)
    }

    pub fn clear(&self) {
        self.agents.clear();
    }

    pub fn agents(&self) -> Arc<Vec<Arc<AgentRecord>>> {
        self.agents.snapshot()
    }

    pub fn get(&self, id: &EntityId) -> Option<Arc<AgentRecord>> {
        self.agents.get(id)
    }

    pub fn len(&self) -> usize {
        self.agents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agents.is_empty()
    }

    pub fn ids(&self) -> Vec<EntityId> {
        self.agents.keys()
    }

    pub fn version(&self) -> u64 {
        self.agents.version()
    }

    pub fn subscribe(&self) -> EntityStream<AgentRecord> {
        EntityStream::new(self.agents.subscribe())
    }
}

impl Default for AgentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use crate::model::AgentStatus;

    #[test]
    fn status_flip_keeps_identity_fields() {
        let store = AgentStore::new();
        store.upsert(AgentUpdate {
            name: Some("edge-1".into()),
            agent_key: Some("k-123".into()),
            status: Some(AgentStatus::On),
            ..AgentUpdate::new(4)
        });
        store.upsert(AgentUpdate {
            status: Some(AgentStatus::Off),
            ..AgentUpdate::new(4)
        });

        let agent = store.get(&EntityId::from(4)).unwrap();
        assert_eq!(agent.name, "edge-1");
        assert_eq!(agent.agent_key, "k-123");
        assert_eq!(agent.status, AgentStatus::Off);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn set_all_then_remove() {
        let store = AgentStore::new();
        store.set_all(vec![
            AgentRecord::from_update(AgentUpdate::new(1)),
            AgentRecord::from_update(AgentUpdate::new(2)),
        ]);
        assert_eq!(store.ids(), vec![EntityId::from(1), EntityId::from(2)]);
        store.remove(&EntityId::from(1));
        store.remove(&EntityId::from(1));
        assert_eq!(store.ids(), vec![EntityId::from(2)]);
        store.clear();
        assert!(store.is_empty());
    }
}
