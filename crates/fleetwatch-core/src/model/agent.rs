// ── Agent domain types ──

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use super::entity_id::EntityId;

/// Whether the agent is currently reporting.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum AgentStatus {
    On,
    #[default]
    Off,
}

impl AgentStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::On => "Online",
            Self::Off => "Offline",
        }
    }
}

/// A registered monitoring agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub agent_id: EntityId,
    pub name: String,
    /// Connection key / hash the agent authenticates with.
    pub agent_key: String,
    pub description: String,
    pub status: AgentStatus,
    pub created_at: Option<DateTime<Utc>>,
}

/// A partial agent update. `None` means "not present in the message".
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AgentUpdate {
    pub agent_id: EntityId,
    pub name: Option<String>,
    pub agent_key: Option<String>,
    pub description: Option<String>,
    pub status: Option<AgentStatus>,
    pub created_at: Option<DateTime<Utc>>,
}

impl AgentUpdate {
    pub fn new(agent_id: impl Into<EntityId>) -> Self {
        Self {
            agent_id: agent_id.into(),
            ..Self::default()
        }
    }
}

impl AgentRecord {
    pub fn from_update(update: AgentUpdate) -> Self {
        let mut record = Self {
            agent_id: update.agent_id.clone(),
            name: String::new(),
            agent_key: String::new(),
            description: String::new(),
            status: AgentStatus::Off,
            created_at: None,
        };
        record.merge(update);
        record
    }

    pub fn merge(&mut self, update: AgentUpdate) {
        if let Some(name) = update.name {
            self.name = name;
        }
        if let Some(key) = update.agent_key {
            self.agent_key = key;
        }
        if let Some(description) = update.description {
            self.description = description;
        }
        if let Some(status) = update.status {
            self.status = status;
        }
        if update.created_at.is_some() {
            self.created_at = update.created_at;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_update_keeps_description() {
        let mut agent = AgentRecord::from_update(AgentUpdate {
            name: Some("edge-01".into()),
            description: Some("rack 4".into()),
            ..AgentUpdate::new(3)
        });
        agent.merge(AgentUpdate {
            status: Some(AgentStatus::On),
            ..AgentUpdate::new(3)
        });

        assert_eq!(agent.description, "rack 4");
        assert_eq!(agent.status, AgentStatus::On);
        assert_eq!(agent.status.label(), "Online");
    }
}
