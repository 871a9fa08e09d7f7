//! Observable session state.

use crate::SessionPhase;
use pulse_protocol_types::{IdentityUser, NotificationRecord, Profile, Role};
use serde::Serialize;

/// Point-in-time view of the session, published on every change.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    /// True while bootstrapping or synchronizing.
    pub loading: bool,
    /// Identity-provider user, set as soon as a sign-in is observed.
    pub identity: Option<IdentityUser>,
    /// Backend profile; absent until fetched or when the fetch failed.
    pub user: Option<Profile>,
    pub notifications: Vec<NotificationRecord>,
    pub unread_count: usize,
    pub channel_open: bool,
    /// Why the session is degraded.
    pub degraded_reason: Option<String>,
    /// Most recent failure of a background sync step.
    pub last_sync_error: Option<String>,
    /// Bumped on every applied identity event.
    pub generation: u64,
}

impl SessionSnapshot {
    pub(crate) fn bootstrapping() -> Self {
        Self {
            phase: SessionPhase::Bootstrapping,
            loading: true,
            identity: None,
            user: None,
            notifications: Vec::new(),
            unread_count: 0,
            channel_open: false,
            degraded_reason: None,
            last_sync_error: None,
            generation: 0,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        self.phase == SessionPhase::Authenticated
    }

    pub fn role(&self) -> Option<Role> {
        self.user.as_ref().map(|profile| profile.role)
    }

    /// Dashboard route for the signed-in user's role.
    pub fn dashboard_path(&self) -> Option<&'static str> {
        self.role().and_then(|role| role.dashboard_path())
    }
}
