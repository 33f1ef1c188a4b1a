// ── Core identity type ──
//
// The backend keys containers and agents by integer ids, but some feeds
// send them as strings. EntityId normalizes both so "7" and 7 address the
// same record.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use fleetwatch_api::WireId;

/// Primary key of a container or agent.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(untagged)]
pub enum EntityId {
    Numeric(i64),
    Text(String),
}

impl EntityId {
    pub fn as_numeric(&self) -> Option<i64> {
        match self {
            Self::Numeric(n) => Some(*n),
            Self::Text(_) => None,
        }
    }
}

impl Default for EntityId {
    fn default() -> Self {
        Self::Numeric(0)
    }
}

impl fmt::Display for EntityId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Numeric(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

impl FromStr for EntityId {
    type Err = std::convert::Infallible;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self::from(s.to_owned()))
    }
}

impl From<i64> for EntityId {
    fn from(n: i64) -> Self {
        Self::Numeric(n)
    }
}

impl From<i32> for EntityId {
    fn from(n: i32) -> Self {
        Self::Numeric(i64::from(n))
    }
}

impl From<String> for EntityId {
    fn from(s: String) -> Self {
        match s.trim().parse::<i64>() {
            Ok(n) => Self::Numeric(n),
            Err(_) => Self::Text(s),
        }
    }
}

impl From<&str> for EntityId {
    fn from(s: &str) -> Self {
        Self::from(s.to_owned())
    }
}

impl From<WireId> for EntityId {
    fn from(id: WireId) -> Self {
        match id {
            WireId::Number(n) => Self::Numeric(n),
            WireId::Text(s) => Self::from(s),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn numeric_strings_normalize() {
        assert_eq!(EntityId::from("7"), EntityId::Numeric(7));
        assert_eq!(EntityId::from(WireId::Text("7".into())), EntityId::from(7));
    }

    #[test]
    fn non_numeric_strings_stay_text() {
        let id = EntityId::from("db-7");
        assert_eq!(id, EntityId::Text("db-7".into()));
        assert_eq!(id.to_string(), "db-7");
        assert!(id.as_numeric().is_none());
    }
}
