//! Shared configuration for fleetwatch tools.
//!
//! TOML profiles layered with `FLEETWATCH_` environment variables, bearer
//! token resolution (env + keyring + plaintext), and translation to
//! `fleetwatch_core::SyncConfig`. Core never reads these types.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;
use url::Url;

use fleetwatch_core::{DEFAULT_MAX_RETRY, SyncConfig, TlsVerification};

/// Keyring service name for stored tokens.
const KEYRING_SERVICE: &str = "fleetwatch";

/// Env var consulted when a profile does not name its own `token_env`.
pub const DEFAULT_TOKEN_ENV: &str = "FLEETWATCH_TOKEN";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("profile '{name}' not found")]
    ProfileNotFound { name: String },

    #[error("keyring error: {0}")]
    Keyring(#[from] keyring::Error),

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Deserialize, Serialize)]
pub struct Config {
    /// Default profile name.
    pub default_profile: Option<String>,

    /// Global defaults.
    #[serde(default)]
    pub defaults: Defaults,

    /// Named deployment profiles.
    #[serde(default)]
    pub profiles: HashMap<String, Profile>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            default_profile: Some("default".into()),
            defaults: Defaults::default(),
            profiles: HashMap::new(),
        }
    }
}

impl Config {
    /// Pick the active profile name: explicit choice, then `default_profile`.
    pub fn active_profile_name(&self, requested: Option<&str>) -> String {
        requested
            .map(str::to_owned)
            .or_else(|| self.default_profile.clone())
            .unwrap_or_else(|| "default".into())
    }

    pub fn profile(&self, name: &str) -> Result<&Profile, ConfigError> {
        self.profiles
            .get(name)
            .ok_or_else(|| ConfigError::ProfileNotFound { name: name.into() })
    }

    /// Sorted profile names, for listings and help text.
    pub fn profile_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.profiles.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct Defaults {
    #[serde(default = "default_output")]
    pub output: String,

    #[serde(default = "default_color")]
    pub color: String,

    #[serde(default)]
    pub insecure: bool,

    /// REST request timeout in seconds.
    #[serde(default = "default_timeout")]
    pub timeout: u64,

    /// Consecutive failed connects before falling back to polling.
    #[serde(default = "default_max_retry")]
    pub max_retry: u32,

    /// REST polling cadence in seconds while in fallback.
    #[serde(default = "default_polling_interval")]
    pub polling_interval: u64,
}

impl Default for Defaults {
    fn default() -> Self {
        Self {
            output: default_output(),
            color: default_color(),
            insecure: false,
            timeout: default_timeout(),
            max_retry: default_max_retry(),
            polling_interval: default_polling_interval(),
        }
    }
}

fn default_output() -> String {
    "table".into()
}
fn default_color() -> String {
    "auto".into()
}
fn default_timeout() -> u64 {
    30
}
fn default_max_retry() -> u32 {
    DEFAULT_MAX_RETRY
}
fn default_polling_interval() -> u64 {
    10
}

/// A named monitoring deployment.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Profile {
    /// Broker WebSocket endpoint (e.g., "wss://monitor.example/ws").
    pub endpoint: String,

    /// REST API root. Derived from `endpoint` when absent.
    pub api_base: Option<String>,

    /// Bearer token (plaintext, prefer keyring or env var).
    pub token: Option<String>,

    /// Environment variable name containing the token.
    pub token_env: Option<String>,

    /// Path to custom CA certificate.
    pub ca_cert: Option<PathBuf>,

    /// Override insecure TLS setting.
    pub insecure: Option<bool>,

    /// Override timeout (seconds).
    pub timeout: Option<u64>,

    /// Override failed-connect threshold.
    pub max_retry: Option<u32>,

    /// Override fallback polling interval (seconds).
    pub polling_interval: Option<u64>,

    /// STOMP heart-beat in seconds; 0 disables.
    pub heartbeat: Option<u64>,
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "fleetwatch", "fleetwatch").map_or_else(
        || {
            let mut p = dirs_fallback();
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

fn dirs_fallback() -> PathBuf {
    let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
    p.push(".config");
    p.push("fleetwatch");
    p
}

// ── Config loading ──────────────────────────────────────────────────

/// Load the full Config from the canonical file + environment.
pub fn load_config() -> Result<Config, ConfigError> {
    load_config_from(&config_path())
}

/// Load from an explicit file, still layered with the environment.
///
/// Nested keys use a double underscore, e.g. `FLEETWATCH_DEFAULTS__TIMEOUT`
/// or `FLEETWATCH_PROFILES__PROD__ENDPOINT`.
pub fn load_config_from(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("FLEETWATCH_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Load config, returning a default if the file doesn't exist or is unreadable.
pub fn load_config_or_default() -> Config {
    load_config().unwrap_or_else(|e| {
        debug!(error = %e, "using default config");
        Config::default()
    })
}

// ── Config saving ───────────────────────────────────────────────────

/// Serialize config to TOML and write to the canonical config path.
pub fn save_config(cfg: &Config) -> Result<(), ConfigError> {
    save_config_to(cfg, &config_path())
}

pub fn save_config_to(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let toml_str = toml::to_string_pretty(cfg)?;
    std::fs::write(path, toml_str)?;
    Ok(())
}

// ── Token resolution ────────────────────────────────────────────────

fn keyring_entry(profile_name: &str) -> Result<keyring::Entry, ConfigError> {
    Ok(keyring::Entry::new(
        KEYRING_SERVICE,
        &format!("{profile_name}/token"),
    )?)
}

/// Resolve the bearer token for a profile.
///
/// Order: the profile's `token_env` (or `FLEETWATCH_TOKEN`), the system
/// keyring, then the plaintext `token` field. `None` means the deployment
/// is accessed anonymously.
pub fn resolve_token(profile: &Profile, profile_name: &str) -> Option<SecretString> {
    // 1. Environment variable
    let env_name = profile.token_env.as_deref().unwrap_or(DEFAULT_TOKEN_ENV);
    if let Ok(val) = std::env::var(env_name) {
        if !val.trim().is_empty() {
            return Some(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring_entry(profile_name) {
        match entry.get_password() {
            Ok(secret) => return Some(SecretString::from(secret)),
            Err(keyring::Error::NoEntry) => {}
            Err(e) => debug!(profile = profile_name, error = %e, "keyring lookup failed"),
        }
    }

    // 3. Plaintext in config
    profile
        .token
        .as_ref()
        .filter(|t| !t.trim().is_empty())
        .map(|t| SecretString::from(t.clone()))
}

/// Store a token for `profile_name` in the system keyring.
pub fn store_token(profile_name: &str, token: &str) -> Result<(), ConfigError> {
    keyring_entry(profile_name)?.set_password(token)?;
    Ok(())
}

/// Remove a stored token. Returns `false` if none was stored.
pub fn clear_token(profile_name: &str) -> Result<bool, ConfigError> {
    match keyring_entry(profile_name)?.delete_credential() {
        Ok(()) => Ok(true),
        Err(keyring::Error::NoEntry) => Ok(false),
        Err(e) => Err(e.into()),
    }
}

// ── Translation to SyncConfig ───────────────────────────────────────

fn parse_url(field: &str, raw: &str, schemes: &[&str]) -> Result<Url, ConfigError> {
    let url: Url = raw.parse().map_err(|_| ConfigError::Validation {
        field: field.into(),
        reason: format!("invalid URL: {raw}"),
    })?;
    if !schemes.contains(&url.scheme()) {
        return Err(ConfigError::Validation {
            field: field.into(),
            reason: format!("expected {} URL, got '{}'", schemes.join("/"), url.scheme()),
        });
    }
    Ok(url)
}

/// Validate a broker endpoint URL (ws/wss).
pub fn parse_endpoint(raw: &str) -> Result<Url, ConfigError> {
    parse_url("endpoint", raw, &["ws", "wss"])
}

/// Validate a REST base URL (http/https).
pub fn parse_api_base(raw: &str) -> Result<Url, ConfigError> {
    parse_url("api_base", raw, &["http", "https"])
}

/// REST root served next to the broker: same host, `/api/`.
pub fn derive_api_base(endpoint: &Url) -> Result<Url, ConfigError> {
    let scheme = if endpoint.scheme() == "wss" {
        "https"
    } else {
        "http"
    };
    let mut base = endpoint.clone();
    base.set_scheme(scheme).map_err(|()| ConfigError::Validation {
        field: "endpoint".into(),
        reason: format!("cannot derive REST base from {endpoint}"),
    })?;
    base.set_path("/api/");
    base.set_query(None);
    base.set_fragment(None);
    Ok(base)
}

/// Build a `SyncConfig` from a profile and the global defaults.
pub fn profile_to_sync_config(
    profile: &Profile,
    profile_name: &str,
    defaults: &Defaults,
) -> Result<SyncConfig, ConfigError> {
    let endpoint = parse_endpoint(&profile.endpoint)?;
    let api_base = match profile.api_base.as_deref() {
        Some(raw) => parse_api_base(raw)?,
        None => derive_api_base(&endpoint)?,
    };

    let tls = if profile.insecure.unwrap_or(defaults.insecure) {
        TlsVerification::DangerAcceptInvalid
    } else if let Some(ref ca_path) = profile.ca_cert {
        TlsVerification::CustomCa(ca_path.clone())
    } else {
        TlsVerification::SystemDefaults
    };

    let max_retry = profile.max_retry.unwrap_or(defaults.max_retry);
    if max_retry == 0 {
        return Err(ConfigError::Validation {
            field: "max_retry".into(),
            reason: "must be at least 1".into(),
        });
    }
    let polling_interval = profile.polling_interval.unwrap_or(defaults.polling_interval);
    if polling_interval == 0 {
        return Err(ConfigError::Validation {
            field: "polling_interval".into(),
            reason: "must be at least 1 second".into(),
        });
    }

    let mut config = SyncConfig::new(endpoint, api_base);
    config.token = resolve_token(profile, profile_name);
    config.tls = tls;
    config.timeout = Duration::from_secs(profile.timeout.unwrap_or(defaults.timeout));
    config.max_retry = max_retry;
    config.polling_interval = Duration::from_secs(polling_interval);
    if let Some(heartbeat) = profile.heartbeat {
        config.heartbeat = Duration::from_secs(heartbeat);
    }
    Ok(config)
}
