//! Session error types.

use pulse_protocol_types::{ChannelError, GatewayError, IdentityError};
use thiserror::Error;

/// Errors surfaced by [`crate::SessionManager`] operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SessionError {
    /// Identity is disabled or failed to initialize; the reason is verbatim.
    #[error("{0}")]
    Configuration(String),

    /// The identity provider rejected a sign-in. Surfaced as-is.
    #[error("{0}")]
    Credential(IdentityError),

    /// Token retrieval or sign-out failed.
    #[error("Identity error: {0}")]
    Identity(#[from] IdentityError),

    /// A backend call failed.
    #[error("Sync failed: {0}")]
    Sync(#[from] GatewayError),

    #[error("Realtime channel error: {0}")]
    Channel(#[from] ChannelError),

    /// `init` has not finished.
    #[error("Session is still initializing")]
    Initializing,

    #[error("Not signed in")]
    NotAuthenticated,

    /// The session did not settle within the configured timeout.
    #[error("Timed out after {0}s waiting for the session to settle")]
    Timeout(u64),

    #[error("Invalid session state transition: {0}")]
    InvalidStateTransition(String),

    #[error("Session has been shut down")]
    ShutDown,
}

impl SessionError {
    /// Stable machine-readable code for CLI output.
    pub fn code(&self) -> &'static str {
        match self {
            SessionError::Configuration(_) => "configuration",
            SessionError::Credential(_) => "credential",
            SessionError::Identity(_) => "identity",
            SessionError::Sync(_) => "sync",
            SessionError::Channel(_) => "channel",
            SessionError::Initializing => "initializing",
            SessionError::NotAuthenticated => "not_authenticated",
            SessionError::Timeout(_) => "timeout",
            SessionError::InvalidStateTransition(_) => "invalid_state_transition",
            SessionError::ShutDown => "shut_down",
        }
    }
}

/// Result type for session operations.
pub type SessionResult<T> = Result<T, SessionError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_configuration_reason_is_verbatim() {
        let err = SessionError::Configuration("Firebase authentication is disabled.".into());
        assert_eq!(err.to_string(), "Firebase authentication is disabled.");
        assert_eq!(err.code(), "configuration");
    }

    #[test]
    fn test_credential_error_surfaces_provider_message() {
        let err = SessionError::Credential(IdentityError::InvalidCredentials(
            "INVALID_LOGIN_CREDENTIALS".into(),
        ));
        assert_eq!(err.to_string(), "Invalid credentials: INVALID_LOGIN_CREDENTIALS");
    }

    #[test]
    fn test_gateway_error_converts_to_sync() {
        let err: SessionError = GatewayError::Network("connection refused".into()).into();
        assert!(matches!(err, SessionError::Sync(_)));
        assert_eq!(err.to_string(), "Sync failed: Network error: connection refused");
    }
}
