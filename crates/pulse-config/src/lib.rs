//! Core configuration, paths and logging setup for the Quality Pulse client.

mod config;
mod error;
mod logging;
mod paths;

pub use config::{
    api_base_url, realtime_base_url, Config, IdentityConfig, RealtimeSettings, SessionSettings,
    DEFAULT_API_URL, DEFAULT_FIREBASE_AUTH_URL, DEFAULT_FIREBASE_TOKEN_URL,
};
pub use error::{ConfigError, ConfigResult};
pub use logging::{init_logging, parse_level};
pub use paths::Paths;
