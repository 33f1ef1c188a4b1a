// ── Runtime sync configuration ──
//
// Describes *where* the broker and REST API live and how to treat failures.
// Built by the CLI (via fleetwatch-config) and handed to `LiveSync`; core
// never reads config files.

use std::time::Duration;

use secrecy::SecretString;
use url::Url;

use crate::connection::DEFAULT_MAX_RETRY;

/// TLS verification strategy for the REST client.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub enum TlsVerification {
    /// System CA store (strict).
    #[default]
    SystemDefaults,
    /// Custom CA certificate file.
    CustomCa(std::path::PathBuf),
    /// Skip verification (self-signed lab deployments).
    DangerAcceptInvalid,
}

/// Configuration for one live-sync session.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Broker WebSocket endpoint (e.g. `wss://monitor.example/ws`).
    pub endpoint: Url,
    /// REST API root (e.g. `https://monitor.example/api/`).
    pub api_base: Url,
    /// Bearer token for both the broker and the REST API.
    pub token: Option<SecretString>,
    pub tls: TlsVerification,
    /// REST request timeout.
    pub timeout: Duration,
    /// Failed attempts before the fallback flag is raised.
    pub max_retry: u32,
    /// REST polling cadence while in fallback.
    pub polling_interval: Duration,
    /// First reconnect delay; doubles up to `reconnect_max_delay`.
    pub reconnect_initial_delay: Duration,
    pub reconnect_max_delay: Duration,
    /// STOMP client heart-beat. Zero disables.
    pub heartbeat: Duration,
}

impl SyncConfig {
    pub fn new(endpoint: Url, api_base: Url) -> Self {
        Self {
            endpoint,
            api_base,
            token: None,
            tls: TlsVerification::default(),
            timeout: Duration::from_secs(30),
            max_retry: DEFAULT_MAX_RETRY,
            polling_interval: Duration::from_secs(10),
            reconnect_initial_delay: Duration::from_secs(1),
            reconnect_max_delay: Duration::from_secs(30),
            heartbeat: Duration::from_secs(10),
        }
    }

    pub fn with_token(mut self, token: SecretString) -> Self {
        self.token = Some(token);
        self
    }

    pub(crate) fn transport(&self) -> fleetwatch_api::TransportConfig {
        let tls = match &self.tls {
            TlsVerification::SystemDefaults => fleetwatch_api::TlsMode::System,
            TlsVerification::CustomCa(path) => fleetwatch_api::TlsMode::CustomCa(path.clone()),
            TlsVerification::DangerAcceptInvalid => fleetwatch_api::TlsMode::DangerAcceptInvalid,
        };
        fleetwatch_api::TransportConfig {
            tls,
            timeout: self.timeout,
        }
    }

    pub(crate) fn stomp(&self) -> fleetwatch_api::StompConfig {
        let mut stomp = fleetwatch_api::StompConfig::new(self.endpoint.clone());
        stomp.token.clone_from(&self.token);
        stomp.reconnect.initial_delay = self.reconnect_initial_delay;
        stomp.reconnect.max_delay = self.reconnect_max_delay;
        stomp.heartbeat = self.heartbeat;
        stomp
    }
}
