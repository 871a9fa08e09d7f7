//! Session manager tests against in-memory collaborators.
//!
//! - `harness.rs`       - fake identity provider, backend and connector
//! - `lifecycle.rs`     - init, degraded mode, login, logout, restore, shutdown
//! - `notifications.rs` - snapshot, pushes, mark-read and failure handling
//! - `races.rs`         - overlapping identity events and stale results

pub(crate) mod harness;
mod notifications;
