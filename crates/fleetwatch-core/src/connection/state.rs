// ── Connection / retry state ──
//
// The single source of truth for transport health. Only the connection
// manager mutates it; everyone else observes through the watch channel or
// the status listeners.

use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;

/// Failed attempts before streaming is considered down.
pub const DEFAULT_MAX_RETRY: u32 = 5;

/// Transport lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ConnectionStatus {
    Connecting,
    Connected,
    #[default]
    Disconnected,
    Error,
}

/// Which kind of transport failure produced an [`ErrorRecord`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ErrorKind {
    /// Handshake failure, dropped socket, broker ERROR frame.
    Connection,
    /// Token rejected. Re-authentication required.
    Auth,
}

/// The most recent transport failure.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ErrorRecord {
    pub kind: ErrorKind,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl ErrorRecord {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            timestamp: Utc::now(),
        }
    }
}

/// Connection status plus retry bookkeeping.
///
/// `connection_failed` is true exactly when `retry_count >= max_retry`.
/// Entering `Connected` resets both in the same write.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ConnectionState {
    pub status: ConnectionStatus,
    pub last_error: Option<ErrorRecord>,
    pub retry_count: u32,
    pub connection_failed: bool,
    pub max_retry: u32,
}

impl Default for ConnectionState {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_RETRY)
    }
}

impl ConnectionState {
    pub fn new(max_retry: u32) -> Self {
        Self {
            status: ConnectionStatus::Disconnected,
            last_error: None,
            retry_count: 0,
            connection_failed: false,
            max_retry,
        }
    }

    pub fn is_connected(&self) -> bool {
        self.status == ConnectionStatus::Connected
    }

    pub(crate) fn begin_attempt(&mut self) {
        self.status = ConnectionStatus::Connecting;
    }

    pub(crate) fn record_connected(&mut self) {
        self.status = ConnectionStatus::Connected;
        self.retry_count = 0;
        self.connection_failed = false;
    }

    /// Count one failed attempt. Returns `true` when this failure is the one
    /// that crossed the threshold.
    pub(crate) fn record_failure(&mut self, error: ErrorRecord) -> bool {
        let was_failed = self.connection_failed;
        self.status = ConnectionStatus::Error;
        self.last_error = Some(error);
        self.retry_count = self.retry_count.saturating_add(1);
        self.connection_failed = self.retry_count >= self.max_retry;
        self.connection_failed && !was_failed
    }

    pub(crate) fn record_disconnected(&mut self) {
        self.status = ConnectionStatus::Disconnected;
    }

    /// Explicit reset of the retry bookkeeping. Status is untouched.
    pub(crate) fn reset(&mut self) {
        self.retry_count = 0;
        self.connection_failed = false;
        self.last_error = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn failure() -> ErrorRecord {
        ErrorRecord::new(ErrorKind::Connection, "refused")
    }

    #[test]
    fn starts_disconnected() {
        let state = ConnectionState::default();
        assert_eq!(state.status, ConnectionStatus::Disconnected);
        assert_eq!(state.retry_count, 0);
        assert!(!state.connection_failed);
        assert_eq!(state.status.to_string(), "disconnected");
    }

    #[test]
    fn five_failures_then_success() {
        let mut state = ConnectionState::default();
        let mut crossings = 0;
        for attempt in 1..=5 {
            state.begin_attempt();
            if state.record_failure(failure()) {
                crossings += 1;
            }
            assert_eq!(state.retry_count, attempt);
            assert_eq!(state.connection_failed, attempt >= 5);
        }
        assert_eq!(crossings, 1);

        state.begin_attempt();
        state.record_connected();
        assert_eq!(state.status, ConnectionStatus::Connected);
        assert_eq!(state.retry_count, 0);
        assert!(!state.connection_failed);
    }

    #[test]
    fn failures_past_threshold_do_not_cross_again() {
        let mut state = ConnectionState::new(2);
        assert!(!state.record_failure(failure()));
        assert!(state.record_failure(failure()));
        assert!(!state.record_failure(failure()));
        assert_eq!(state.retry_count, 3);
        assert!(state.connection_failed);
    }

    #[test]
    fn disconnect_keeps_the_counter() {
        let mut state = ConnectionState::default();
        state.record_failure(failure());
        state.record_disconnected();
        assert_eq!(state.retry_count, 1);
    }

    #[test]
    fn reset_clears_failure_bookkeeping() {
        let mut state = ConnectionState::new(1);
        state.record_failure(ErrorRecord::new(ErrorKind::Auth, "expired"));
        assert!(state.connection_failed);

        state.reset();
        assert_eq!(state.retry_count, 0);
        assert!(!state.connection_failed);
        assert!(state.last_error.is_none());
        assert_eq!(state.status, ConnectionStatus::Error);
    }
}
