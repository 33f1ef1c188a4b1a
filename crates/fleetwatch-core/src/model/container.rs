// ── Container domain types ──

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumIter};

use super::entity_id::EntityId;

/// Container lifecycle state as reported by the agent's runtime.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ContainerState {
    Running,
    Created,
    Restarting,
    Paused,
    Exited,
    Dead,
    Removing,
    #[default]
    Unknown,
}

impl ContainerState {
    /// Display label for tables and badges.
    pub fn label(self) -> &'static str {
        match self {
            Self::Running => "Running",
            Self::Created => "Created",
            Self::Restarting => "Restarting",
            Self::Paused => "Paused",
            Self::Exited => "Exited",
            Self::Dead => "Dead",
            Self::Removing => "Removing",
            Self::Unknown => "Unknown",
        }
    }

    pub fn is_running(self) -> bool {
        matches!(self, Self::Running)
    }
}

/// Healthcheck result.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize, Display, EnumIter,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum HealthStatus {
    Healthy,
    Unhealthy,
    Starting,
    /// The container defines no healthcheck.
    #[serde(rename = "none")]
    #[strum(serialize = "none")]
    Unchecked,
    #[default]
    Unknown,
}

impl HealthStatus {
    pub fn label(self) -> &'static str {
        match self {
            Self::Healthy => "Healthy",
            Self::Unhealthy => "Unhealthy",
            Self::Starting => "Starting",
            Self::Unchecked => "No healthcheck",
            Self::Unknown => "Unknown",
        }
    }
}

/// One row of the container dashboard.
///
/// Sizes are already converted for display: memory in MB, storage in GB,
/// network rates in kbps, percentages to one decimal.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerRecord {
    pub container_id: EntityId,
    pub name: String,
    pub agent_name: String,
    pub cpu_percent: f64,
    pub memory_used_mb: f64,
    pub memory_limit_mb: f64,
    pub memory_percent: f64,
    pub storage_used_gb: f64,
    pub storage_limit_gb: f64,
    pub network_rx_kbps: f64,
    pub network_tx_kbps: f64,
    pub state: ContainerState,
    pub health: HealthStatus,
    /// Client-local flag; the server never sets it.
    pub is_favorite: bool,
    pub last_updated: Option<DateTime<Utc>>,
}

/// A partial container update. `None` means "not present in the message".
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ContainerUpdate {
    pub container_id: EntityId,
    pub name: Option<String>,
    pub agent_name: Option<String>,
    pub cpu_percent: Option<f64>,
    pub memory_used_mb: Option<f64>,
    pub memory_limit_mb: Option<f64>,
    pub storage_used_gb: Option<f64>,
    pub storage_limit_gb: Option<f64>,
    pub network_rx_kbps: Option<f64>,
    pub network_tx_kbps: Option<f64>,
    pub state: Option<ContainerState>,
    pub health: Option<HealthStatus>,
    pub is_favorite: Option<bool>,
    pub last_updated: Option<DateTime<Utc>>,
}

impl ContainerUpdate {
    pub fn new(container_id: impl Into<EntityId>) -> Self {
        Self {
            container_id: container_id.into(),
            ..Self::default()
        }
    }
}

impl ContainerRecord {
    /// Build a fresh record; fields absent from the update default to
    /// zero / empty / unknown.
    pub fn from_update(update: ContainerUpdate) -> Self {
        let mut record = Self {
            container_id: update.container_id.clone(),
            name: String::new(),
            agent_name: String::new(),
            cpu_percent: 0.0,
            memory_used_mb: 0.0,
            memory_limit_mb: 0.0,
            memory_percent: 0.0,
            storage_used_gb: 0.0,
            storage_limit_gb: 0.0,
            network_rx_kbps: 0.0,
            network_tx_kbps: 0.0,
            state: ContainerState::Unknown,
            health: HealthStatus::Unknown,
            is_favorite: false,
            last_updated: None,
        };
        record.merge(update);
        record
    }

    /// Shallow merge: present fields win, absent fields are preserved.
    pub fn merge(&mut self, update: ContainerUpdate) {
        fn set<T>(slot: &mut T, value: Option<T>) {
            if let Some(value) = value {
                *slot = value;
            }
        }

        set(&mut self.name, update.name);
        set(&mut self.agent_name, update.agent_name);
        set(&mut self.cpu_percent, update.cpu_percent);
        set(&mut self.memory_used_mb, update.memory_used_mb);
        set(&mut self.memory_limit_mb, update.memory_limit_mb);
        set(&mut self.storage_used_gb, update.storage_used_gb);
        set(&mut self.storage_limit_gb, update.storage_limit_gb);
        set(&mut self.network_rx_kbps, update.network_rx_kbps);
        set(&mut self.network_tx_kbps, update.network_tx_kbps);
        set(&mut self.state, update.state);
        set(&mut self.health, update.health);
        set(&mut self.is_favorite, update.is_favorite);
        if update.last_updated.is_some() {
            self.last_updated = update.last_updated;
        }
        self.memory_percent = crate::convert::percent_of(self.memory_used_mb, self.memory_limit_mb);
    }
}

/// Detailed view of the selected container.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ContainerDetail {
    pub summary: ContainerRecord,
    pub image: String,
    pub command: String,
    pub created_at: Option<DateTime<Utc>>,
    pub restart_count: u32,
    /// Rendered as `public:private/proto`, or `private/proto` when unpublished.
    pub ports: Vec<String>,
    pub labels: BTreeMap<String, String>,
}

impl ContainerDetail {
    pub fn id(&self) -> &EntityId {
        &self.summary.container_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strum::IntoEnumIterator;

    #[test]
    fn scenario_partial_update_preserves_name() {
        let mut record = ContainerRecord::from_update(ContainerUpdate {
            name: Some("db-1".into()),
            cpu_percent: Some(10.0),
            ..ContainerUpdate::new(7)
        });
        record.merge(ContainerUpdate {
            cpu_percent: Some(55.0),
            ..ContainerUpdate::new(7)
        });

        assert_eq!(record.container_id, EntityId::Numeric(7));
        assert_eq!(record.name, "db-1");
        assert!((record.cpu_percent - 55.0).abs() < f64::EPSILON);
    }

    #[test]
    fn favorite_survives_server_updates() {
        let mut record = ContainerRecord::from_update(ContainerUpdate::new(1));
        record.merge(ContainerUpdate {
            is_favorite: Some(true),
            ..ContainerUpdate::new(1)
        });
        record.merge(ContainerUpdate {
            state: Some(ContainerState::Exited),
            ..ContainerUpdate::new(1)
        });
        assert!(record.is_favorite);
        assert_eq!(record.state, ContainerState::Exited);
    }

    #[test]
    fn memory_percent_follows_merged_values() {
        let mut record = ContainerRecord::from_update(ContainerUpdate {
            memory_used_mb: Some(256.0),
            memory_limit_mb: Some(1024.0),
            ..ContainerUpdate::new(1)
        });
        assert!((record.memory_percent - 25.0).abs() < f64::EPSILON);

        record.merge(ContainerUpdate {
            memory_used_mb: Some(512.0),
            ..ContainerUpdate::new(1)
        });
        assert!((record.memory_percent - 50.0).abs() < f64::EPSILON);
    }

    #[test]
    fn every_state_has_a_label() {
        for state in ContainerState::iter() {
            assert!(!state.label().is_empty());
        }
        assert_eq!(HealthStatus::Unchecked.to_string(), "none");
        assert_eq!(ContainerState::Running.to_string(), "running");
    }
}
