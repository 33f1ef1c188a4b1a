// ── Bearer token decoding ──
//
// Derives the display identity from a JWT's payload segment. The signature
// is never checked. A missing or malformed token means "no current user".

use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::debug;

use fleetwatch_api::WireId;

use crate::model::CurrentUser;

#[derive(Deserialize)]
struct Claims {
    #[serde(default)]
    id: Option<WireId>,
    #[serde(default)]
    sub: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    role: Option<String>,
    /// NumericDate: integer or fractional seconds.
    #[serde(default)]
    exp: Option<f64>,
}

#[allow(clippy::cast_possible_truncation, clippy::as_conversions)]
fn numeric_date(exp: f64) -> Option<DateTime<Utc>> {
    if !exp.is_finite() {
        return None;
    }
    let millis = (exp * 1000.0).round();
    if millis.abs() > 8.64e18 {
        return None;
    }
    DateTime::<Utc>::from_timestamp_millis(millis as i64)
}

/// Decode the current user from a bearer token, if there is a usable one.
pub fn decode_current_user(token: Option<&SecretString>) -> Option<CurrentUser> {
    let token = token?.expose_secret().trim();
    if token.is_empty() {
        return None;
    }
    let token = token.strip_prefix("Bearer ").unwrap_or(token);

    let mut segments = token.split('.');
    let (Some(_header), Some(payload), Some(_signature), None) = (
        segments.next(),
        segments.next(),
        segments.next(),
        segments.next(),
    ) else {
        debug!("token is not a three-segment JWT");
        return None;
    };

    let bytes = match URL_SAFE_NO_PAD.decode(payload.trim_end_matches('=')) {
        Ok(bytes) => bytes,
        Err(e) => {
            debug!(error = %e, "token payload is not base64url");
            return None;
        }
    };
    let claims: Claims = match serde_json::from_slice(&bytes) {
        Ok(claims) => claims,
        Err(e) => {
            debug!(error = %e, "token payload is not a claims object");
            return None;
        }
    };

    let id = claims
        .id
        .map(|id| id.to_string())
        .or_else(|| claims.sub.clone())?;
    let username = claims.username.or(claims.sub).unwrap_or_else(|| id.clone());

    Some(CurrentUser {
        id,
        username,
        role: claims.role.unwrap_or_default(),
        expires_at: claims.exp.and_then(numeric_date),
    })
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn token(claims: &str) -> SecretString {
        let header = URL_SAFE_NO_PAD.encode(br#"{"alg":"HS256","typ":"JWT"}"#);
        let payload = URL_SAFE_NO_PAD.encode(claims.as_bytes());
        SecretString::from(format!("{header}.{payload}.c2lnbmF0dXJl"))
    }

    #[test]
    fn decodes_full_claims() {
        let t = token(r#"{"id":42,"sub":"alice","username":"alice","role":"ADMIN","exp":1700000000}"#);
        let user = decode_current_user(Some(&t)).unwrap();
        assert_eq!(user.id, "42");
        assert_eq!(user.username, "alice");
        assert!(user.is_admin());
        assert_eq!(user.expires_at.unwrap().timestamp(), 1_700_000_000);
        assert!(user.is_expired());
    }

    #[test]
    fn fractional_expiry_is_accepted() {
        let t = token(r#"{"sub":"dave","exp":1700000000.75}"#);
        let user = decode_current_user(Some(&t)).unwrap();
        let expires = user.expires_at.unwrap();
        assert_eq!(expires.timestamp(), 1_700_000_000);
        assert_eq!(expires.timestamp_subsec_millis(), 750);

        let t = token(r#"{"sub":"dave","exp":1e300}"#);
        let user = decode_current_user(Some(&t)).unwrap();
        assert!(user.expires_at.is_none());
    }

    #[test]
    fn falls_back_to_sub() {
        let t = token(r#"{"sub":"bob"}"#);
        let user = decode_current_user(Some(&t)).unwrap();
        assert_eq!(user.id, "bob");
        assert_eq!(user.username, "bob");
        assert_eq!(user.role, "");
        assert!(user.expires_at.is_none());
        assert!(!user.is_expired());
    }

    #[test]
    fn bearer_prefix_is_accepted() {
        let raw = token(r#"{"sub":"carol"}"#);
        let prefixed = SecretString::from(format!("Bearer {}", raw.expose_secret()));
        assert_eq!(decode_current_user(Some(&prefixed)).unwrap().id, "carol");
    }

    #[test]
    fn absent_or_malformed_is_none() {
        assert!(decode_current_user(None).is_none());
        assert!(decode_current_user(Some(&SecretString::from(""))).is_none());
        assert!(decode_current_user(Some(&SecretString::from("not-a-jwt"))).is_none());
        assert!(decode_current_user(Some(&SecretString::from("a.%%%.c"))).is_none());
        assert!(decode_current_user(Some(&token("[1,2]"))).is_none());
        assert!(decode_current_user(Some(&token(r#"{"role":"user"}"#))).is_none());
    }
}
