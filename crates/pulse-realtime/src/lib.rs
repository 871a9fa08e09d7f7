//! Realtime notification channel.
//!
//! The backend pushes notifications over Socket.IO. [`SocketIoConnector`]
//! speaks the Engine.IO v4 WebSocket transport directly, scopes the socket
//! to one user with a `join` event, and reconnects with capped exponential
//! backoff, re-joining the user's room after each reconnect.

mod client;
pub mod protocol;

pub use client::{socket_url, ConnectionState, RealtimeConfig, SocketIoChannel, SocketIoConnector};

#[cfg(test)]
mod tests;
