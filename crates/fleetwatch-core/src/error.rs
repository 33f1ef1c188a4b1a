// ── Core error types ──
//
// Consumer-facing errors from fleetwatch-core. Raw transport failures never
// reach stores or views directly: `From<fleetwatch_api::Error>` sorts them
// into connection, auth, parse and API variants.

use thiserror::Error;

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Connection errors ────────────────────────────────────────────
    /// Transport-level failure. Counts toward the retry threshold.
    #[error("Connection error: {message}")]
    Connection { message: String },

    /// Stale or invalid token. Consumers should force re-authentication.
    #[error("Authentication failed: {message}")]
    Auth { message: String },

    /// An operation that needs a live session was called without one.
    #[error("Not connected")]
    NotConnected,

    // ── Subscription errors ──────────────────────────────────────────
    #[error(transparent)]
    Subscription(#[from] SubscriptionError),

    // ── Data errors ──────────────────────────────────────────────────
    /// Inbound payload could not be decoded.
    #[error("Malformed message on {destination}: {message}")]
    MessageParse { destination: String, message: String },

    #[error("API error: {message}")]
    Api {
        message: String,
        /// HTTP status code (if applicable).
        status: Option<u16>,
    },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

impl CoreError {
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth { .. })
    }
}

/// Attach/detach failures, surfaced only to the consumer that asked.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SubscriptionError {
    #[error("Cannot subscribe to {destination}: no live connection (call connect() first)")]
    NotConnected { destination: String },

    #[error("Subscription transport failure: {message}")]
    Transport { message: String },
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<fleetwatch_api::Error> for CoreError {
    fn from(err: fleetwatch_api::Error) -> Self {
        use fleetwatch_api::Error as Api;

        match err {
            Api::Authentication { message } => CoreError::Auth { message },
            Api::Transport(ref e) => {
                if e.is_timeout() || e.is_connect() {
                    CoreError::Connection {
                        message: e.to_string(),
                    }
                } else {
                    CoreError::Api {
                        message: e.to_string(),
                        status: e.status().map(|s| s.as_u16()),
                    }
                }
            }
            Api::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            Api::Tls(msg) => CoreError::Connection {
                message: format!("TLS error: {msg}"),
            },
            Api::Api { status, message } => CoreError::Api {
                message,
                status: Some(status),
            },
            e @ (Api::WebSocketConnect(_) | Api::WebSocketClosed { .. } | Api::Stomp { .. }) => {
                CoreError::Connection {
                    message: e.to_string(),
                }
            }
            Api::Frame(message) => CoreError::MessageParse {
                destination: String::new(),
                message,
            },
            Api::TransportClosed => CoreError::NotConnected,
            Api::Deserialization { message, body: _ } => CoreError::MessageParse {
                destination: String::new(),
                message,
            },
        }
    }
}
