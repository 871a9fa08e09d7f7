//! Client session core for Quality Pulse.
//!
//! [`SessionManager`] owns the signed-in user's lifecycle: it tracks the
//! identity provider, loads the backend profile and notification list,
//! keeps one realtime channel open per signed-in identity, and exposes the
//! result as a [`SessionSnapshot`] stream. Collaborators are injected as
//! trait objects from `pulse-protocol-types`.

mod error;
pub mod machine;
mod manager;
mod snapshot;
mod store;

pub use error::{SessionError, SessionResult};
pub use machine::SessionPhase;
pub use manager::{SessionManager, SessionOptions};
pub use snapshot::SessionSnapshot;
pub use store::NotificationStore;

#[cfg(test)]
mod tests;
