//! Collaborator interfaces consumed by the session core.

use crate::{
    ChannelError, GatewayError, IdentityError, IdentityEvent, IdentityUser, NotificationRecord,
    Profile,
};
use async_trait::async_trait;
use tokio::sync::{broadcast, mpsc};

/// Identity provider: authenticates credentials, issues bearer tokens and
/// reports identity-state changes.
#[async_trait]
pub trait IdentityProvider: Send + Sync {
    /// Whether identity is enabled in this deployment. A disabled provider
    /// puts the session into the degraded state.
    fn is_enabled(&self) -> bool {
        true
    }

    /// Prepare the provider (restore a persisted session, validate config).
    async fn initialize(&self) -> Result<(), IdentityError>;

    /// Subscribe to identity-state changes.
    fn subscribe(&self) -> broadcast::Receiver<IdentityEvent>;

    /// The currently signed-in identity, if any.
    fn current_user(&self) -> Option<IdentityUser>;

    /// Authenticate with email and password. On success a `SignedIn` event
    /// is emitted to subscribers.
    async fn sign_in(&self, email: &str, password: &str) -> Result<IdentityUser, IdentityError>;

    /// End the identity session. Emits `SignedOut`.
    async fn sign_out(&self) -> Result<(), IdentityError>;

    /// Fresh bearer token for the current identity.
    async fn id_token(&self) -> Result<String, IdentityError>;
}

/// Backend API used by the session core. Every call takes a bearer token.
#[async_trait]
pub trait BackendGateway: Send + Sync {
    async fn fetch_profile(&self, token: &str) -> Result<Profile, GatewayError>;

    async fn list_notifications(&self, token: &str)
        -> Result<Vec<NotificationRecord>, GatewayError>;

    async fn mark_notification_read(&self, token: &str, id: &str) -> Result<(), GatewayError>;

    async fn mark_all_notifications_read(&self, token: &str) -> Result<(), GatewayError>;
}

/// Opens realtime channels to the backend's push endpoint.
#[async_trait]
pub trait RealtimeConnector: Send + Sync {
    async fn connect(&self) -> Result<Box<dyn ChannelHandle>, ChannelError>;
}

/// One open realtime channel.
#[async_trait]
pub trait ChannelHandle: Send {
    /// Scope the channel to a user id. Pushes for that user start arriving
    /// on the notification receiver.
    async fn join(&mut self, user_id: &str) -> Result<(), ChannelError>;

    /// Take the receiver of pushed notifications. Returns `None` after the
    /// first call.
    fn take_notifications(&mut self) -> Option<mpsc::Receiver<NotificationRecord>>;

    /// Close the channel. Safe to call more than once.
    async fn disconnect(&mut self);
}
