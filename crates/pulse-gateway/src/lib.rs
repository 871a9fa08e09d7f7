//! REST client for the Quality Pulse backend.
//!
//! [`ApiClient`] implements the session core's `BackendGateway` (profile sync
//! and notification endpoints) and also exposes the unauthenticated
//! governance and health endpoints used during first-run setup.

mod client;
mod governance;

pub use client::ApiClient;
pub use governance::{
    BootstrapAdminRequest, BootstrapAdminResponse, BootstrappedUser, GovernanceStatus,
};

/// Minimum password length accepted by the bootstrap-admin flow.
pub const MIN_PASSWORD_LEN: usize = 6;
