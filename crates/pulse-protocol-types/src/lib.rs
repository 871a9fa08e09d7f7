//! Shared domain types and collaborator interfaces.
//!
//! The session core consumes three external collaborators (identity
//! provider, backend gateway, realtime channel). Their interfaces live here
//! so the core and the concrete adapters can depend on them without
//! depending on each other.

mod error;
mod traits;
mod types;

pub use error::{ChannelError, GatewayError, IdentityError};
pub use traits::{BackendGateway, ChannelHandle, IdentityProvider, RealtimeConnector};
pub use types::{IdentityEvent, IdentityUser, NotificationRecord, Profile, Role};

/// Reason reported when identity is administratively disabled.
pub const IDENTITY_DISABLED: &str = "Firebase authentication is disabled.";

/// Reason reported when identity is enabled but not configured.
pub const IDENTITY_NOT_CONFIGURED: &str = "Firebase authentication is not configured.";
