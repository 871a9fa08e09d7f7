//! Collaborator error types.
//!
//! Adapters map their transport errors (HTTP, WebSocket, file I/O) into
//! these enums so the session core never sees transport types.

use thiserror::Error;

/// Errors raised by an identity provider.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum IdentityError {
    #[error("Identity provider is not configured: {0}")]
    NotConfigured(String),

    #[error("Invalid credentials: {0}")]
    InvalidCredentials(String),

    #[error("Not signed in")]
    NotSignedIn,

    #[error("Token refresh failed: {0}")]
    TokenRefresh(String),

    #[error("Identity provider rejected the request: {status} - {message}")]
    Provider { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Unexpected identity provider response: {0}")]
    InvalidResponse(String),

    #[error("Session storage error: {0}")]
    Storage(String),
}

impl IdentityError {
    /// Returns true if retrying the same request may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            IdentityError::Network(_) => true,
            IdentityError::Provider { status, .. } => *status >= 500 || *status == 429,
            _ => false,
        }
    }
}

/// Errors raised by the backend gateway.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    #[error("Backend error: {status} - {message}")]
    Api { status: u16, message: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("Failed to decode backend response: {0}")]
    Decode(String),

    #[error("Invalid request: {0}")]
    Validation(String),
}

impl GatewayError {
    /// HTTP status of the failed call, when the backend answered.
    pub fn status(&self) -> Option<u16> {
        match self {
            GatewayError::Api { status, .. } => Some(*status),
            _ => None,
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self.status(), Some(401) | Some(403))
    }
}

/// Errors raised by a realtime channel.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChannelError {
    #[error("Invalid channel endpoint: {0}")]
    InvalidEndpoint(String),

    #[error("Channel connection failed: {0}")]
    Connection(String),

    #[error("Channel protocol error: {0}")]
    Protocol(String),

    #[error("Channel closed")]
    Closed,
}
