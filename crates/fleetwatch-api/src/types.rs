// ── Wire DTOs ──
//
// Shapes exactly as the monitoring backend sends them (camelCase JSON).
// Every field except the primary key is optional: partial updates over
// the WebSocket only carry what changed. Mapping into UI view-models
// lives in `fleetwatch-core::convert`.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Primary key as sent on the wire: numeric or string.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireId {
    Number(i64),
    Text(String),
}

impl fmt::Display for WireId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Timestamp as sent on the wire: epoch milliseconds or an ISO-8601 string
/// (with or without zone offset).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum WireTimestamp {
    EpochMillis(i64),
    Text(String),
}

/// Inbound payloads are either a single DTO or a batch.
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum OneOrMany<T> {
    Many(Vec<T>),
    One(T),
}

impl<T> OneOrMany<T> {
    pub fn into_vec(self) -> Vec<T> {
        match self {
            Self::Many(items) => items,
            Self::One(item) => vec![item],
        }
    }
}

// ── Containers ───────────────────────────────────────────────────────

/// One row of the container dashboard feed (`/topic/dashboard`).
///
/// Sizes are raw bytes, network rates raw bytes per second.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDto {
    pub container_id: Option<WireId>,
    #[serde(alias = "name")]
    pub container_name: Option<String>,
    pub agent_name: Option<String>,
    pub cpu_percent: Option<f64>,
    pub memory_usage: Option<u64>,
    pub memory_limit: Option<u64>,
    pub storage_usage: Option<u64>,
    pub storage_limit: Option<u64>,
    pub network_rx_bytes_per_sec: Option<f64>,
    pub network_tx_bytes_per_sec: Option<f64>,
    pub state: Option<String>,
    pub health: Option<String>,
    pub is_favorite: Option<bool>,
    pub timestamp: Option<WireTimestamp>,
}

/// Published port mapping on a container.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PortDto {
    pub private_port: Option<u16>,
    pub public_port: Option<u16>,
    #[serde(rename = "type", alias = "protocol")]
    pub protocol: Option<String>,
}

/// Detailed container view (`/topic/containers/{id}` and REST detail).
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDetailDto {
    #[serde(flatten)]
    pub summary: ContainerDto,
    pub image: Option<String>,
    pub command: Option<String>,
    pub created_at: Option<WireTimestamp>,
    pub restart_count: Option<u32>,
    pub ports: Option<Vec<PortDto>>,
    pub labels: Option<BTreeMap<String, String>>,
}

// ── Agents ───────────────────────────────────────────────────────────

/// Agent status row (`/topic/agents` and REST list).
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgentDto {
    pub agent_id: Option<WireId>,
    #[serde(alias = "name")]
    pub agent_name: Option<String>,
    #[serde(alias = "agentHash")]
    pub agent_key: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub created_at: Option<WireTimestamp>,
}

// ── Outbound ─────────────────────────────────────────────────────────

/// Action frame published to `/app/<domain>/subscribe`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FeedRequest {
    pub action: String,
    /// Epoch milliseconds.
    pub timestamp: i64,
}

impl FeedRequest {
    pub fn subscribe_at(timestamp: i64) -> Self {
        Self {
            action: "subscribe".into(),
            timestamp,
        }
    }

    pub fn subscribe_now() -> Self {
        Self::subscribe_at(chrono::Utc::now().timestamp_millis())
    }
}
