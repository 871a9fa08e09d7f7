//! Integration tests for the realtime channel.
//!
//! - `harness.rs` - in-process Socket.IO server
//! - `channel.rs` - handshake, join, push delivery, reconnection, shutdown
