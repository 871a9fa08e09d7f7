//! Firebase Authentication over its REST APIs.

use crate::refresh::RefreshPolicy;
use crate::store::{SessionStore, StoredSession};
use crate::{IDENTITY_DISABLED, IDENTITY_NOT_CONFIGURED};
use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use parking_lot::Mutex;
use pulse_config::IdentityConfig;
use pulse_protocol_types::{IdentityError, IdentityEvent, IdentityProvider, IdentityUser};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

const EVENT_CAPACITY: usize = 16;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct SignInRequest<'a> {
    email: &'a str,
    password: &'a str,
    return_secure_token: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct SignInResponse {
    local_id: String,
    #[serde(default)]
    email: Option<String>,
    id_token: String,
    refresh_token: String,
    expires_in: Seconds,
}

#[derive(Debug, Serialize)]
struct RefreshRequest<'a> {
    grant_type: &'static str,
    refresh_token: &'a str,
}

#[derive(Debug, Deserialize)]
struct RefreshResponse {
    id_token: String,
    refresh_token: String,
    expires_in: Seconds,
    user_id: String,
}

/// Token lifetimes arrive as strings from Firebase but as numbers from some
/// emulators.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum Seconds {
    Text(String),
    Number(i64),
}

/// Token lifetime assumed when the provider sends an unusable one.
const DEFAULT_LIFETIME_SECS: i64 = 3600;

impl Seconds {
    fn as_secs(&self) -> i64 {
        match self {
            Seconds::Text(s) => s.trim().parse().unwrap_or(DEFAULT_LIFETIME_SECS),
            Seconds::Number(n) => *n,
        }
    }

    /// Expiry of a token issued at `now`.
    fn expiry_from(&self, now: DateTime<Utc>) -> DateTime<Utc> {
        Duration::try_seconds(self.as_secs())
            .and_then(|lifetime| now.checked_add_signed(lifetime))
            .unwrap_or_else(|| now + Duration::seconds(DEFAULT_LIFETIME_SECS))
    }
}

#[derive(Debug, Deserialize)]
struct ErrorEnvelope {
    error: ErrorBody,
}

#[derive(Debug, Deserialize)]
struct ErrorBody {
    #[serde(default)]
    message: String,
}

fn map_http_error(err: reqwest::Error) -> IdentityError {
    if err.is_decode() {
        IdentityError::InvalidResponse(err.to_string())
    } else {
        IdentityError::Network(err.to_string())
    }
}

/// Pull the provider's error code (`INVALID_LOGIN_CREDENTIALS`, ...) out of a
/// failed response, falling back to the raw body.
async fn error_message(response: reqwest::Response) -> String {
    let body = response.text().await.unwrap_or_default();
    serde_json::from_str::<ErrorEnvelope>(&body)
        .map(|envelope| envelope.error.message)
        .ok()
        .filter(|message| !message.is_empty())
        .unwrap_or(body)
}

/// Identity provider backed by Firebase Authentication.
pub struct FirebaseIdentityClient {
    http_client: Client,
    enabled: bool,
    api_key: Option<String>,
    auth_url: String,
    token_url: String,
    refresh_policy: RefreshPolicy,
    store: Arc<dyn SessionStore>,
    session: Mutex<Option<StoredSession>>,
    /// Serializes refreshes so concurrent token requests share one round-trip.
    refresh_lock: tokio::sync::Mutex<()>,
    events: broadcast::Sender<IdentityEvent>,
}

impl std::fmt::Debug for FirebaseIdentityClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FirebaseIdentityClient")
            .field("enabled", &self.enabled)
            .field("auth_url", &self.auth_url)
            .field("token_url", &self.token_url)
            .finish_non_exhaustive()
    }
}

impl FirebaseIdentityClient {
    pub fn new(config: &IdentityConfig, store: Arc<dyn SessionStore>) -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            http_client: Client::new(),
            enabled: config.enabled,
            api_key: config.api_key.clone().filter(|key| !key.trim().is_empty()),
            auth_url: config.auth_url.trim_end_matches('/').to_string(),
            token_url: config.token_url.trim_end_matches('/').to_string(),
            refresh_policy: RefreshPolicy::default(),
            store,
            session: Mutex::new(None),
            refresh_lock: tokio::sync::Mutex::new(()),
            events,
        }
    }

    pub fn with_refresh_policy(mut self, refresh_policy: RefreshPolicy) -> Self {
        self.refresh_policy = refresh_policy;
        self
    }

    fn api_key(&self) -> Result<&str, IdentityError> {
        if !self.enabled {
            return Err(IdentityError::NotConfigured(IDENTITY_DISABLED.to_string()));
        }
        self.api_key
            .as_deref()
            .ok_or_else(|| IdentityError::NotConfigured(IDENTITY_NOT_CONFIGURED.to_string()))
    }

    fn emit(&self, event: IdentityEvent) {
        // No subscribers is fine; the event is simply dropped.
        let _ = self.events.send(event);
    }

    fn persist(&self, session: &StoredSession) {
        if let Err(e) = self.store.save(session) {
            warn!(error = %e, "Failed to persist identity session");
        }
    }

    /// Drop the local session and persisted tokens. Returns true if a
    /// session existed.
    fn clear_session(&self) -> bool {
        let had_session = self.session.lock().take().is_some();
        if let Err(e) = self.store.clear() {
            warn!(error = %e, "Failed to clear persisted identity session");
        }
        had_session
    }

    /// Refresh the session with exponential backoff retry.
    ///
    /// A non-transient failure means the refresh token was revoked or
    /// expired server-side: the session is cleared and `SignedOut` emitted.
    async fn refresh_with_backoff(&self, refresh_token: &str) -> Result<String, IdentityError> {
        let mut last_error = None;

        for attempt in 0..self.refresh_policy.attempts {
            match self.try_refresh(refresh_token).await {
                Ok(token) => return Ok(token),
                Err(e) if e.is_transient() => {
                    if let Some(delay) = self.refresh_policy.backoff_after(attempt) {
                        debug!(
                            attempt = attempt + 1,
                            error = %e,
                            delay_ms = delay.as_millis() as u64,
                            "Transient refresh failure, retrying"
                        );
                        tokio::time::sleep(delay).await;
                    }
                    last_error = Some(e);
                }
                Err(e) => {
                    warn!(error = %e, "Refresh rejected, signing out");
                    if self.clear_session() {
                        self.emit(IdentityEvent::SignedOut);
                    }
                    return Err(IdentityError::TokenRefresh(e.to_string()));
                }
            }
        }

        // Transient failures keep the session; a later call may succeed.
        warn!(
            attempts = self.refresh_policy.attempts,
            "Refresh failed after all attempts"
        );
        Err(IdentityError::TokenRefresh(
            last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no refresh attempts configured".to_string()),
        ))
    }

    /// Single attempt to refresh the session.
    async fn try_refresh(&self, refresh_token: &str) -> Result<String, IdentityError> {
        let url = format!("{}/v1/token", self.token_url);
        debug!(url = %url, "Refreshing identity token");

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key()?)])
            .json(&RefreshRequest {
                grant_type: "refresh_token",
                refresh_token,
            })
            .send()
            .await
            .map_err(map_http_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            warn!(status = %status, message = %message, "Token refresh failed");
            return Err(IdentityError::Provider {
                status: status.as_u16(),
                message,
            });
        }

        let data: RefreshResponse = response.json().await.map_err(map_http_error)?;
        let mut guard = self.session.lock();
        let Some(current) = guard.as_mut() else {
            return Err(IdentityError::NotSignedIn);
        };
        if current.uid != data.user_id {
            return Err(IdentityError::InvalidResponse(format!(
                "refresh returned user {} for session of {}",
                data.user_id, current.uid
            )));
        }

        current.id_token = data.id_token.clone();
        current.refresh_token = data.refresh_token;
        current.expires_at = data.expires_in.expiry_from(Utc::now());
        let snapshot = current.clone();
        drop(guard);

        self.persist(&snapshot);
        info!(uid = %snapshot.uid, "Identity token refreshed");
        Ok(data.id_token)
    }
}

#[async_trait]
impl IdentityProvider for FirebaseIdentityClient {
    fn is_enabled(&self) -> bool {
        self.enabled
    }

    async fn initialize(&self) -> Result<(), IdentityError> {
        self.api_key()?;

        match self.store.load()? {
            Some(stored) => {
                info!(uid = %stored.uid, "Restored persisted identity session");
                *self.session.lock() = Some(stored);
            }
            None => debug!("No persisted identity session"),
        }
        Ok(())
    }

    fn subscribe(&self) -> broadcast::Receiver<IdentityEvent> {
        self.events.subscribe()
    }

    fn current_user(&self) -> Option<IdentityUser> {
        self.session.lock().as_ref().map(StoredSession::user)
    }

    async fn sign_in(&self, email: &str, password: &str) -> Result<IdentityUser, IdentityError> {
        let url = format!("{}/v1/accounts:signInWithPassword", self.auth_url);
        debug!(url = %url, email = %email, "Attempting email/password sign-in");

        let response = self
            .http_client
            .post(&url)
            .query(&[("key", self.api_key()?)])
            .json(&SignInRequest {
                email,
                password,
                return_secure_token: true,
            })
            .send()
            .await
            .map_err(map_http_error)?;

        let status = response.status();
        if !status.is_success() {
            let message = error_message(response).await;
            warn!(status = %status, message = %message, "Sign-in failed");
            return Err(if status.is_client_error() && status.as_u16() != 429 {
                IdentityError::InvalidCredentials(message)
            } else {
                IdentityError::Provider {
                    status: status.as_u16(),
                    message,
                }
            });
        }

        let data: SignInResponse = response.json().await.map_err(map_http_error)?;
        let session = StoredSession {
            uid: data.local_id,
            email: data.email.or_else(|| Some(email.to_string())),
            id_token: data.id_token,
            refresh_token: data.refresh_token,
            expires_at: data.expires_in.expiry_from(Utc::now()),
        };
        let user = session.user();

        self.persist(&session);
        *self.session.lock() = Some(session);

        info!(uid = %user.uid, "Sign-in successful");
        self.emit(IdentityEvent::SignedIn(user.clone()));
        Ok(user)
    }

    async fn sign_out(&self) -> Result<(), IdentityError> {
        if self.clear_session() {
            info!("Signed out");
            self.emit(IdentityEvent::SignedOut);
        } else {
            debug!("Sign-out requested with no active session");
        }
        Ok(())
    }

    async fn id_token(&self) -> Result<String, IdentityError> {
        let _refresh = self.refresh_lock.lock().await;

        let (token, refresh_token, stale) = {
            let guard = self.session.lock();
            let session = guard.as_ref().ok_or(IdentityError::NotSignedIn)?;
            (
                session.id_token.clone(),
                session.refresh_token.clone(),
                self.refresh_policy.needs_refresh(session, Utc::now()),
            )
        };

        if !stale {
            return Ok(token);
        }

        debug!("Identity token near expiry, refreshing");
        self.refresh_with_backoff(&refresh_token).await
    }
}
