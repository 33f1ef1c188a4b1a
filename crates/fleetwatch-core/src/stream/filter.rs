// ── Filter predicates for entity streams ──
//
// Used by consumers to narrow snapshots without touching the store.

use crate::model::{AgentRecord, AgentStatus, ContainerRecord, ContainerState, HealthStatus};

/// Filter predicate for container collections.
pub enum ContainerFilter {
    All,
    ByState(ContainerState),
    ByHealth(HealthStatus),
    ByAgent(String),
    /// Case-insensitive substring match on the container name.
    NameContains(String),
    Running,
    Favorites,
    Custom(Box<dyn Fn(&ContainerRecord) -> bool + Send + Sync>),
}

impl ContainerFilter {
    pub fn matches(&self, container: &ContainerRecord) -> bool {
        match self {
            Self::All => true,
            Self::ByState(state) => container.state == *state,
            Self::ByHealth(health) => container.health == *health,
            Self::ByAgent(agent) => container.agent_name == *agent,
            Self::NameContains(needle) => container
                .name
                .to_lowercase()
                .contains(&needle.to_lowercase()),
            Self::Running => container.state.is_running(),
            Self::Favorites => container.is_favorite,
            Self::Custom(f) => f(container),
        }
    }
}

/// Filter predicate for agent collections.
pub enum AgentFilter {
    All,
    Online,
    Offline,
    Custom(Box<dyn Fn(&AgentRecord) -> bool + Send + Sync>),
}

impl AgentFilter {
    pub fn matches(&self, agent: &AgentRecord) -> bool {
        match self {
            Self::All => true,
            Self::Online => agent.status == AgentStatus::On,
            Self::Offline => agent.status == AgentStatus::Off,
            Self::Custom(f) => f(agent),
        }
    }
}
