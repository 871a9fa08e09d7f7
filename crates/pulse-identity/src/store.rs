//! Persistence for the signed-in identity session.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use pulse_protocol_types::{IdentityError, IdentityUser};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Tokens and identity of one signed-in user.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredSession {
    pub uid: String,
    #[serde(default)]
    pub email: Option<String>,
    pub id_token: String,
    pub refresh_token: String,
    pub expires_at: DateTime<Utc>,
}

impl StoredSession {
    pub fn user(&self) -> IdentityUser {
        IdentityUser {
            uid: self.uid.clone(),
            email: self.email.clone(),
        }
    }
}

/// Trait for identity session storage backends.
pub trait SessionStore: Send + Sync {
    /// Load the persisted session, if any.
    fn load(&self) -> Result<Option<StoredSession>, IdentityError>;

    /// Persist a session, replacing any previous one.
    fn save(&self, session: &StoredSession) -> Result<(), IdentityError>;

    /// Remove the persisted session. Returns true if one existed.
    fn clear(&self) -> Result<bool, IdentityError>;
}

/// JSON file store at `~/.quality-pulse/identity-session.json`.
#[derive(Debug, Clone)]
pub struct FileSessionStore {
    path: PathBuf,
}

impl FileSessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn storage_err(err: impl std::fmt::Display) -> IdentityError {
    IdentityError::Storage(err.to_string())
}

impl SessionStore for FileSessionStore {
    fn load(&self) -> Result<Option<StoredSession>, IdentityError> {
        let content = match std::fs::read_to_string(&self.path) {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(storage_err(e)),
        };

        match serde_json::from_str(&content) {
            Ok(session) => Ok(Some(session)),
            Err(e) => {
                warn!(
                    path = %self.path.display(),
                    error = %e,
                    "Discarding unreadable identity session file"
                );
                Ok(None)
            }
        }
    }

    fn save(&self, session: &StoredSession) -> Result<(), IdentityError> {
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent).map_err(storage_err)?;
        }

        let content = serde_json::to_string_pretty(session).map_err(storage_err)?;
        let tmp = self.path.with_extension("json.tmp");
        std::fs::write(&tmp, content).map_err(storage_err)?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;
            std::fs::set_permissions(&tmp, std::fs::Permissions::from_mode(0o600))
                .map_err(storage_err)?;
        }

        std::fs::rename(&tmp, &self.path).map_err(storage_err)?;
        debug!(path = %self.path.display(), uid = %session.uid, "Identity session saved");
        Ok(())
    }

    fn clear(&self) -> Result<bool, IdentityError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
            Err(e) => Err(storage_err(e)),
        }
    }
}

/// In-memory store, for tests and ephemeral processes.
#[derive(Debug, Default)]
pub struct MemorySessionStore {
    inner: Mutex<Option<StoredSession>>,
}

impl MemorySessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_session(session: StoredSession) -> Self {
        Self {
            inner: Mutex::new(Some(session)),
        }
    }
}

impl SessionStore for MemorySessionStore {
    fn load(&self) -> Result<Option<StoredSession>, IdentityError> {
        Ok(self.inner.lock().clone())
    }

    fn save(&self, session: &StoredSession) -> Result<(), IdentityError> {
        *self.inner.lock() = Some(session.clone());
        Ok(())
    }

    fn clear(&self) -> Result<bool, IdentityError> {
        Ok(self.inner.lock().take().is_some())
    }
}
