//! Record-level access control list
//!
//! Wire form of `_access`:
//!
//! ```json
//! [{"public": true, "level": "read"}, {"role": "admin", "level": "write"}, {"user_id": "u1", "level": "read"}]
//! ```

use serde::{Deserialize, Serialize};

use crate::acl::Principal;

/// Access level. `Write` implies `Read`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AccessLevel {
    Read,
    Write,
}

impl AccessLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessLevel::Read => "read",
            AccessLevel::Write => "write",
        }
    }
}

/// Who an access entry applies to
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessTarget {
    Public,
    Role(String),
    User(String),
}

impl AccessTarget {
    fn matches(&self, principal: &Principal) -> bool {
        match self {
            AccessTarget::Public => true,
            AccessTarget::Role(role) => principal.has_role(role),
            AccessTarget::User(user_id) => principal.user_id() == Some(user_id.as_str()),
        }
    }
}

/// Single `_access` entry
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawAccessEntry", into = "RawAccessEntry")]
pub struct AccessEntry {
    pub target: AccessTarget,
    pub level: AccessLevel,
}

impl AccessEntry {
    pub fn public(level: AccessLevel) -> Self {
        Self {
            target: AccessTarget::Public,
            level,
        }
    }

    pub fn role(role: impl Into<String>, level: AccessLevel) -> Self {
        Self {
            target: AccessTarget::Role(role.into()),
            level,
        }
    }

    pub fn user(user_id: impl Into<String>, level: AccessLevel) -> Self {
        Self {
            target: AccessTarget::User(user_id.into()),
            level,
        }
    }
}

#[derive(Serialize, Deserialize)]
struct RawAccessEntry {
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    public: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user_id: Option<String>,
    level: AccessLevel,
}

impl TryFrom<RawAccessEntry> for AccessEntry {
    type Error = String;

    fn try_from(raw: RawAccessEntry) -> Result<Self, Self::Error> {
        let target = match (raw.public, raw.role, raw.user_id) {
            (true, None, None) => AccessTarget::Public,
            (false, Some(role), None) => AccessTarget::Role(role),
            (false, None, Some(user_id)) => AccessTarget::User(user_id),
            _ => {
                return Err(
                    "access entry must specify exactly one of public, role or user_id".to_string(),
                )
            }
        };
        Ok(Self {
            target,
            level: raw.level,
        })
    }
}

impl From<AccessEntry> for RawAccessEntry {
    fn from(entry: AccessEntry) -> Self {
        let (public, role, user_id) = match entry.target {
            AccessTarget::Public => (true, None, None),
            AccessTarget::Role(role) => (false, Some(role), None),
            AccessTarget::User(user_id) => (false, None, Some(user_id)),
        };
        Self {
            public,
            role,
            user_id,
            level: entry.level,
        }
    }
}

/// Ordered list of access entries attached to a record
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RecordAcl(Vec<AccessEntry>);

impl RecordAcl {
    pub fn new(entries: Vec<AccessEntry>) -> Self {
        Self(entries)
    }

    pub fn entries(&self) -> &[AccessEntry] {
        &self.0
    }

    /// Whether any entry grants `level` (or higher) to the principal
    pub fn accessible(&self, principal: &Principal, level: AccessLevel) -> bool {
        self.0
            .iter()
            .any(|entry| entry.level >= level && entry.target.matches(principal))
    }
}
