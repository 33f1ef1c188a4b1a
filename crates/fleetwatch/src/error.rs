//! CLI error types with miette diagnostics.
//!
//! Maps `CoreError` and `ConfigError` into user-facing errors with
//! actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use fleetwatch_config::ConfigError;
use fleetwatch_core::CoreError;

/// Process exit codes.
pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const NOT_FOUND: i32 = 4;
    pub const CONNECTION: i32 = 7;
    pub const TIMEOUT: i32 = 8;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────
    #[error("Could not reach {url}")]
    #[diagnostic(
        code(fleetwatch::connection_failed),
        help(
            "Check that the deployment is running and reachable.\n\
             Reason: {message}"
        )
    )]
    ConnectionFailed { url: String, message: String },

    #[error("Streaming is down after {attempts} failed attempts")]
    #[diagnostic(
        code(fleetwatch::stream_unavailable),
        help("The broker keeps refusing connections. Data is only available via REST polling.")
    )]
    StreamUnavailable { attempts: u32 },

    // ── Authentication ───────────────────────────────────────────────
    #[error("Authentication failed")]
    #[diagnostic(
        code(fleetwatch::auth_failed),
        help(
            "The token was rejected or has expired.\n\
             Run: fleetwatch config set-token --profile {profile}"
        )
    )]
    AuthFailed { profile: String },

    #[error("No token configured for profile '{profile}'")]
    #[diagnostic(
        code(fleetwatch::no_token),
        help(
            "Store one with: fleetwatch config set-token\n\
             Or set the FLEETWATCH_TOKEN environment variable."
        )
    )]
    NoToken { profile: String },

    // ── Resources ────────────────────────────────────────────────────
    #[error("{resource_type} '{identifier}' not found")]
    #[diagnostic(
        code(fleetwatch::not_found),
        help("Run: fleetwatch {list_command} to see available {resource_type}s")
    )]
    NotFound {
        resource_type: String,
        identifier: String,
        list_command: String,
    },

    // ── API ──────────────────────────────────────────────────────────
    #[error("API error ({status}): {message}")]
    #[diagnostic(code(fleetwatch::api_error))]
    ApiError { status: String, message: String },

    // ── Validation ───────────────────────────────────────────────────
    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(fleetwatch::validation))]
    Validation { field: String, reason: String },

    // ── Configuration ────────────────────────────────────────────────
    #[error("Profile '{name}' not found in configuration")]
    #[diagnostic(
        code(fleetwatch::profile_not_found),
        help(
            "Available profiles: {available}\n\
             Create one with: fleetwatch config add {name} --url wss://HOST/ws"
        )
    )]
    ProfileNotFound { name: String, available: String },

    #[error("No deployment configured")]
    #[diagnostic(
        code(fleetwatch::no_config),
        help(
            "Create a profile with: fleetwatch config add default --url wss://HOST/ws\n\
             Or pass --endpoint. Expected config at: {path}"
        )
    )]
    NoConfig { path: String },

    #[error("Keyring error: {reason}")]
    #[diagnostic(
        code(fleetwatch::keyring),
        help("Use the FLEETWATCH_TOKEN environment variable if no keyring is available.")
    )]
    Keyring { reason: String },

    #[error(transparent)]
    #[diagnostic(code(fleetwatch::config))]
    Config(ConfigError),

    // ── Timeout ──────────────────────────────────────────────────────
    #[error("Timed out after {seconds}s")]
    #[diagnostic(
        code(fleetwatch::timeout),
        help("Increase the wait with --wait or check broker responsiveness.")
    )]
    Timeout { seconds: u64 },

    // ── IO / Serialization ───────────────────────────────────────────
    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("JSON encoding failed: {0}")]
    #[diagnostic(code(fleetwatch::json))]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } | Self::StreamUnavailable { .. } => {
                exit_code::CONNECTION
            }
            Self::AuthFailed { .. } | Self::NoToken { .. } => exit_code::AUTH,
            Self::NotFound { .. } => exit_code::NOT_FOUND,
            Self::Timeout { .. } => exit_code::TIMEOUT,
            Self::Validation { .. } | Self::ProfileNotFound { .. } | Self::NoConfig { .. } => {
                exit_code::USAGE
            }
            _ => exit_code::GENERAL,
        }
    }
}

// ── ConfigError → CliError mapping ───────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation { field, reason },
            ConfigError::ProfileNotFound { name } => Self::ProfileNotFound {
                name,
                available: String::new(),
            },
            ConfigError::Keyring(e) => Self::Keyring {
                reason: e.to_string(),
            },
            ConfigError::Io(e) => Self::Io(e),
            other => Self::Config(other),
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Connection { message } => Self::ConnectionFailed {
                url: "broker".into(),
                message,
            },
            CoreError::Auth { message: _ } => Self::AuthFailed {
                profile: "current".into(),
            },
            CoreError::NotConnected => Self::ConnectionFailed {
                url: "broker".into(),
                message: "no live connection".into(),
            },
            CoreError::Subscription(e) => Self::ConnectionFailed {
                url: "broker".into(),
                message: e.to_string(),
            },
            CoreError::MessageParse {
                destination,
                message,
            } => Self::ApiError {
                status: "parse".into(),
                message: if destination.is_empty() {
                    message
                } else {
                    format!("{destination}: {message}")
                },
            },
            CoreError::Api {
                message,
                status: Some(404),
            } => Self::NotFound {
                resource_type: "resource".into(),
                identifier: message,
                list_command: "containers list".into(),
            },
            CoreError::Api { message, status } => Self::ApiError {
                status: status.map_or_else(|| "-".into(), |s| s.to_string()),
                message,
            },
            CoreError::Config { message } => Self::Validation {
                field: "config".into(),
                reason: message,
            },
            CoreError::Internal(message) => Self::ApiError {
                status: "internal".into(),
                message,
            },
        }
    }
}
