// ── Current user ──

use chrono::{DateTime, Utc};
use serde::Serialize;

/// Display identity derived from the bearer token's payload.
///
/// The token is decoded, not verified: this drives what the dashboard shows,
/// never what the backend allows.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CurrentUser {
    pub id: String,
    pub username: String,
    pub role: String,
    pub expires_at: Option<DateTime<Utc>>,
}

impl CurrentUser {
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|exp| exp <= now)
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Utc::now())
    }

    pub fn is_admin(&self) -> bool {
        self.role.eq_ignore_ascii_case("admin") || self.role.eq_ignore_ascii_case("role_admin")
    }
}
