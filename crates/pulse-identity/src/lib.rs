//! Identity provider adapter.
//!
//! `FirebaseIdentityClient` talks to the Firebase Identity Toolkit and Secure
//! Token REST APIs, caches the short-lived ID token, refreshes it with
//! exponential backoff, and persists the session through a [`SessionStore`].

mod firebase;
mod refresh;
mod store;

pub use firebase::FirebaseIdentityClient;
pub use refresh::RefreshPolicy;
pub use pulse_protocol_types::{IDENTITY_DISABLED, IDENTITY_NOT_CONFIGURED};
pub use store::{FileSessionStore, MemorySessionStore, SessionStore, StoredSession};
