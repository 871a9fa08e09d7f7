//! Domain types exchanged between the session core and its collaborators.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Application role of a dashboard user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    Admin,
    Engineer,
    /// Any role string this client does not know about.
    #[serde(other)]
    Unknown,
}

impl Role {
    /// Dashboard route a user with this role lands on.
    pub fn dashboard_path(&self) -> Option<&'static str> {
        match self {
            Role::Admin => Some("/admin"),
            Role::Engineer => Some("/engineer"),
            Role::Unknown => None,
        }
    }

    /// Returns true if this role may view the given role's dashboard.
    pub fn can_access(&self, dashboard: Role) -> bool {
        *self != Role::Unknown && *self == dashboard
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Role::Admin => "admin",
            Role::Engineer => "engineer",
            Role::Unknown => "unknown",
        };
        f.write_str(name)
    }
}

/// Authoritative application-side user record returned by `GET /auth/me`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub name: String,
    pub email: String,
    pub role: Role,
}

/// Identity as known to the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IdentityUser {
    /// Provider-unique user id; scopes the realtime channel.
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// Identity-state change delivered to the single registered listener.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityEvent {
    SignedIn(IdentityUser),
    SignedOut,
}

/// One notification, as delivered by `GET /notifications` or a realtime push.
///
/// Everything other than id, read flag and timestamp is carried opaquely in
/// `payload` (message, type, report references, ...).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NotificationRecord {
    #[serde(alias = "_id")]
    pub id: String,
    #[serde(default)]
    pub is_read: bool,
    /// Absent when the backend did not send one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(flatten)]
    pub payload: Map<String, Value>,
}

impl NotificationRecord {
    /// Build a record with an empty payload.
    pub fn new(id: impl Into<String>, is_read: bool, created_at: DateTime<Utc>) -> Self {
        Self {
            id: id.into(),
            is_read,
            created_at: Some(created_at),
            payload: Map::new(),
        }
    }

    /// The human-readable message, when the payload carries one.
    pub fn message(&self) -> Option<&str> {
        self.payload.get("message").and_then(Value::as_str)
    }
}
