// ── Wire-to-domain conversions ──
//
// Bridges raw `fleetwatch_api` DTOs into `fleetwatch_core::model` view
// models. Enum parsing is total (unknown values map to an explicit
// fallback), sizes are converted for display, and missing optional data
// stays `None` on updates so merges preserve what the store already has.

use chrono::{DateTime, NaiveDateTime, Utc};

use fleetwatch_api::{AgentDto, ContainerDetailDto, ContainerDto, PortDto, WireTimestamp};

use crate::error::CoreError;
use crate::model::{
    AgentRecord, AgentStatus, AgentUpdate, ContainerDetail, ContainerRecord, ContainerState,
    ContainerUpdate, EntityId, HealthStatus,
};

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;
const BYTES_PER_GB: f64 = 1024.0 * 1024.0 * 1024.0;

// ── Numeric helpers ────────────────────────────────────────────────

/// Round half away from zero to `places` decimals.
fn round_to(value: f64, places: i32) -> f64 {
    if !value.is_finite() {
        return 0.0;
    }
    let factor = 10f64.powi(places);
    (value * factor).round() / factor
}

#[allow(clippy::cast_precision_loss, clippy::as_conversions)]
fn bytes_as_f64(bytes: u64) -> f64 {
    bytes as f64
}

/// Bytes to mebibytes, two decimals.
pub fn bytes_to_mb(bytes: u64) -> f64 {
    round_to(bytes_as_f64(bytes) / BYTES_PER_MB, 2)
}

/// Bytes to gibibytes, two decimals.
pub fn bytes_to_gb(bytes: u64) -> f64 {
    round_to(bytes_as_f64(bytes) / BYTES_PER_GB, 2)
}

/// Bytes per second to kilobits per second, one decimal.
pub fn bytes_per_sec_to_kbps(bytes_per_sec: f64) -> f64 {
    round_to(bytes_per_sec * 8.0 / 1000.0, 1)
}

/// Percentage, one decimal.
pub fn percent(value: f64) -> f64 {
    round_to(value, 1)
}

/// `part / whole` as a one-decimal percentage; 0 when `whole` is zero.
pub fn percent_of(part: f64, whole: f64) -> f64 {
    if whole <= 0.0 {
        0.0
    } else {
        percent(part / whole * 100.0)
    }
}

// ── Timestamps ─────────────────────────────────────────────────────

/// Epoch millis, RFC 3339, or a zone-less ISO-8601 string (read as UTC).
pub fn parse_timestamp(raw: &WireTimestamp) -> Option<DateTime<Utc>> {
    match raw {
        WireTimestamp::EpochMillis(ms) => DateTime::from_timestamp_millis(*ms),
        WireTimestamp::Text(s) => {
            let s = s.trim();
            DateTime::parse_from_rfc3339(s)
                .map(|dt| dt.with_timezone(&Utc))
                .ok()
                .or_else(|| {
                    ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"]
                        .iter()
                        .find_map(|fmt| NaiveDateTime::parse_from_str(s, fmt).ok())
                        .map(|naive| naive.and_utc())
                })
        }
    }
}

fn parse_timestamp_opt(raw: Option<&WireTimestamp>) -> Option<DateTime<Utc>> {
    raw.and_then(parse_timestamp)
}

// ── Enum normalization ─────────────────────────────────────────────

/// Map a runtime state string (any case) to `ContainerState`.
pub fn parse_container_state(raw: &str) -> ContainerState {
    match raw.trim().to_ascii_lowercase().as_str() {
        "running" | "up" => ContainerState::Running,
        "created" => ContainerState::Created,
        "restarting" => ContainerState::Restarting,
        "paused" => ContainerState::Paused,
        "exited" | "stopped" => ContainerState::Exited,
        "dead" => ContainerState::Dead,
        "removing" => ContainerState::Removing,
        _ => ContainerState::Unknown,
    }
}

/// Map a healthcheck string (any case) to `HealthStatus`.
pub fn parse_health_status(raw: &str) -> HealthStatus {
    match raw.trim().to_ascii_lowercase().as_str() {
        "healthy" => HealthStatus::Healthy,
        "unhealthy" => HealthStatus::Unhealthy,
        "starting" => HealthStatus::Starting,
        "none" | "no_healthcheck" => HealthStatus::Unchecked,
        _ => HealthStatus::Unknown,
    }
}

/// Map an agent status string to `AgentStatus`. Anything unrecognized is `Off`.
pub fn parse_agent_status(raw: &str) -> AgentStatus {
    match raw.trim().to_ascii_uppercase().as_str() {
        "ON" | "ONLINE" | "CONNECTED" | "UP" => AgentStatus::On,
        _ => AgentStatus::Off,
    }
}

fn render_port(port: &PortDto) -> Option<String> {
    let private = port.private_port?;
    let proto = port
        .protocol
        .as_deref()
        .map_or_else(|| "tcp".to_owned(), str::to_ascii_lowercase);
    Some(match port.public_port {
        Some(public) => format!("{public}:{private}/{proto}"),
        None => format!("{private}/{proto}"),
    })
}

// ── Containers ─────────────────────────────────────────────────────

impl TryFrom<ContainerDto> for ContainerUpdate {
    type Error = CoreError;

    fn try_from(dto: ContainerDto) -> Result<Self, Self::Error> {
        let container_id = dto.container_id.ok_or_else(|| CoreError::MessageParse {
            destination: String::new(),
            message: "container payload without containerId".into(),
        })?;

        Ok(ContainerUpdate {
            container_id: EntityId::from(container_id),
            name: dto.container_name,
            agent_name: dto.agent_name,
            cpu_percent: dto.cpu_percent.map(percent),
            memory_used_mb: dto.memory_usage.map(bytes_to_mb),
            memory_limit_mb: dto.memory_limit.map(bytes_to_mb),
            storage_used_gb: dto.storage_usage.map(bytes_to_gb),
            storage_limit_gb: dto.storage_limit.map(bytes_to_gb),
            network_rx_kbps: dto.network_rx_bytes_per_sec.map(bytes_per_sec_to_kbps),
            network_tx_kbps: dto.network_tx_bytes_per_sec.map(bytes_per_sec_to_kbps),
            state: dto.state.as_deref().map(parse_container_state),
            health: dto.health.as_deref().map(parse_health_status),
            is_favorite: dto.is_favorite,
            last_updated: parse_timestamp_opt(dto.timestamp.as_ref()),
        })
    }
}

impl TryFrom<ContainerDto> for ContainerRecord {
    type Error = CoreError;

    fn try_from(dto: ContainerDto) -> Result<Self, Self::Error> {
        ContainerUpdate::try_from(dto).map(ContainerRecord::from_update)
    }
}

impl TryFrom<ContainerDetailDto> for ContainerDetail {
    type Error = CoreError;

    fn try_from(dto: ContainerDetailDto) -> Result<Self, Self::Error> {
        let summary = ContainerRecord::try_from(dto.summary)?;
        Ok(ContainerDetail {
            summary,
            image: dto.image.unwrap_or_default(),
            command: dto.command.unwrap_or_default(),
            created_at: parse_timestamp_opt(dto.created_at.as_ref()),
            restart_count: dto.restart_count.unwrap_or(0),
            ports: dto
                .ports
                .unwrap_or_default()
                .iter()
                .filter_map(render_port)
                .collect(),
            labels: dto.labels.unwrap_or_default(),
        })
    }
}

// ── Agents ─────────────────────────────────────────────────────────

impl TryFrom<AgentDto> for AgentUpdate {
    type Error = CoreError;

    fn try_from(dto: AgentDto) -> Result<Self, Self::Error> {
        let agent_id = dto.agent_id.ok_or_else(|| CoreError::MessageParse {
            destination: String::new(),
            message: "agent payload without agentId".into(),
        })?;

        Ok(AgentUpdate {
            agent_id: EntityId::from(agent_id),
            name: dto.agent_name,
            agent_key: dto.agent_key,
            description: dto.description,
            status: dto.status.as_deref().map(parse_agent_status),
            created_at: parse_timestamp_opt(dto.created_at.as_ref()),
        })
    }
}

impl TryFrom<AgentDto> for AgentRecord {
    type Error = CoreError;

    fn try_from(dto: AgentDto) -> Result<Self, Self::Error> {
        AgentUpdate::try_from(dto).map(AgentRecord::from_update)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use fleetwatch_api::WireId;
    use pretty_assertions::assert_eq;

    #[test]
    fn unit_conversions_use_binary_and_decimal_bases() {
        assert!((bytes_to_mb(268_435_456) - 256.0).abs() < f64::EPSILON);
        assert!((bytes_to_mb(1_500_000) - 1.43).abs() < f64::EPSILON);
        assert!((bytes_to_gb(5_368_709_120) - 5.0).abs() < f64::EPSILON);
        assert!((bytes_per_sec_to_kbps(1250.0) - 10.0).abs() < f64::EPSILON);
        assert!((bytes_per_sec_to_kbps(1234.0) - 9.9).abs() < f64::EPSILON);
        assert!((percent(12.345) - 12.3).abs() < f64::EPSILON);
        assert!((percent_of(1.0, 0.0)).abs() < f64::EPSILON);
        assert!((round_to(f64::NAN, 2)).abs() < f64::EPSILON);
    }

    #[test]
    fn every_known_container_state_maps_to_its_label() {
        let cases = [
            ("RUNNING", ContainerState::Running, "Running"),
            ("created", ContainerState::Created, "Created"),
            ("Restarting", ContainerState::Restarting, "Restarting"),
            ("paused", ContainerState::Paused, "Paused"),
            ("EXITED", ContainerState::Exited, "Exited"),
            ("dead", ContainerState::Dead, "Dead"),
            ("removing", ContainerState::Removing, "Removing"),
        ];
        for (wire, expected, label) in cases {
            let state = parse_container_state(wire);
            assert_eq!(state, expected, "wire value {wire}");
            assert_eq!(state.label(), label);
        }
        assert_eq!(parse_container_state("hibernating"), ContainerState::Unknown);
        assert_eq!(parse_container_state(""), ContainerState::Unknown);
    }

    #[test]
    fn every_known_health_status_maps_to_its_label() {
        let cases = [
            ("HEALTHY", HealthStatus::Healthy, "Healthy"),
            ("unhealthy", HealthStatus::Unhealthy, "Unhealthy"),
            ("starting", HealthStatus::Starting, "Starting"),
            ("none", HealthStatus::Unchecked, "No healthcheck"),
        ];
        for (wire, expected, label) in cases {
            let health = parse_health_status(wire);
            assert_eq!(health, expected);
            assert_eq!(health.label(), label);
        }
        assert_eq!(parse_health_status("degraded"), HealthStatus::Unknown);
    }

    #[test]
    fn agent_status_falls_back_to_off() {
        assert_eq!(parse_agent_status("ON"), AgentStatus::On);
        assert_eq!(parse_agent_status("on"), AgentStatus::On);
        assert_eq!(parse_agent_status("OFF"), AgentStatus::Off);
        assert_eq!(parse_agent_status("SLEEPING"), AgentStatus::Off);
        assert_eq!(AgentStatus::On.label(), "Online");
        assert_eq!(AgentStatus::Off.label(), "Offline");
    }

    #[test]
    fn container_dto_maps_to_display_units() {
        let dto = ContainerDto {
            container_id: Some(WireId::Number(7)),
            container_name: Some("db-1".into()),
            cpu_percent: Some(10.04),
            memory_usage: Some(536_870_912),
            memory_limit: Some(1_073_741_824),
            network_rx_bytes_per_sec: Some(2500.0),
            state: Some("RUNNING".into()),
            ..ContainerDto::default()
        };

        let record = ContainerRecord::try_from(dto).unwrap();

        assert_eq!(record.container_id, EntityId::Numeric(7));
        assert_eq!(record.name, "db-1");
        assert!((record.cpu_percent - 10.0).abs() < f64::EPSILON);
        assert!((record.memory_used_mb - 512.0).abs() < f64::EPSILON);
        assert!((record.memory_percent - 50.0).abs() < f64::EPSILON);
        assert!((record.network_rx_kbps - 20.0).abs() < f64::EPSILON);
        assert_eq!(record.state, ContainerState::Running);
        assert_eq!(record.health, HealthStatus::Unknown);
        assert_eq!(record.agent_name, "");
        assert!(!record.is_favorite);
    }

    #[test]
    fn missing_fields_stay_absent_on_updates() {
        let dto = ContainerDto {
            container_id: Some(WireId::Text("7".into())),
            cpu_percent: Some(55.0),
            ..ContainerDto::default()
        };
        let update = ContainerUpdate::try_from(dto).unwrap();
        assert_eq!(update.container_id, EntityId::Numeric(7));
        assert!(update.name.is_none());
        assert!(update.is_favorite.is_none());
    }

    #[test]
    fn payload_without_key_is_a_parse_error() {
        let err = ContainerUpdate::try_from(ContainerDto::default()).unwrap_err();
        assert!(matches!(err, CoreError::MessageParse { .. }));
        assert!(AgentUpdate::try_from(AgentDto::default()).is_err());
    }

    #[test]
    fn detail_renders_ports_and_defaults() {
        let dto = ContainerDetailDto {
            summary: ContainerDto {
                container_id: Some(WireId::Number(3)),
                ..ContainerDto::default()
            },
            ports: Some(vec![
                PortDto {
                    private_port: Some(80),
                    public_port: Some(8080),
                    protocol: Some("TCP".into()),
                },
                PortDto {
                    private_port: Some(53),
                    public_port: None,
                    protocol: Some("udp".into()),
                },
                PortDto::default(),
            ]),
            ..ContainerDetailDto::default()
        };

        let detail = ContainerDetail::try_from(dto).unwrap();
        assert_eq!(detail.ports, vec!["8080:80/tcp".to_owned(), "53/udp".to_owned()]);
        assert_eq!(detail.image, "");
        assert_eq!(detail.restart_count, 0);
        assert!(detail.labels.is_empty());
    }

    #[test]
    fn timestamps_accept_every_wire_shape() {
        let millis = parse_timestamp(&WireTimestamp::EpochMillis(1_700_000_000_000)).unwrap();
        assert_eq!(millis.timestamp(), 1_700_000_000);

        let zoned = parse_timestamp(&WireTimestamp::Text("2024-05-01T10:00:00+02:00".into())).unwrap();
        assert_eq!(zoned.to_rfc3339(), "2024-05-01T08:00:00+00:00");

        let naive = parse_timestamp(&WireTimestamp::Text("2024-05-01T10:00:00.123".into())).unwrap();
        assert_eq!(naive.timestamp_subsec_millis(), 123);

        assert!(parse_timestamp(&WireTimestamp::Text("yesterday".into())).is_none());
    }

    #[test]
    fn agent_dto_maps_created_at() {
        let dto = AgentDto {
            agent_id: Some(WireId::Number(1)),
            agent_name: Some("edge-01".into()),
            status: Some("ON".into()),
            created_at: Some(WireTimestamp::Text("2024-05-01T10:00:00".into())),
            ..AgentDto::default()
        };
        let agent = AgentRecord::try_from(dto).unwrap();
        assert_eq!(agent.status, AgentStatus::On);
        assert_eq!(agent.description, "");
        assert!(agent.created_at.is_some());
    }
}
