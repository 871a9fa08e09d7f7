//! Configuration management for the client.

use crate::{ConfigError, ConfigResult, Paths};
use serde::{Deserialize, Serialize};
use std::path::Path;
use url::Url;

/// Default backend API URL (can be overridden at compile time via PULSE_API_URL env var).
pub const DEFAULT_API_URL: &str = match option_env!("PULSE_API_URL") {
    Some(url) => url,
    None => "http://localhost:5000/api",
};

/// Default Firebase Web API key (compile time via PULSE_FIREBASE_API_KEY env var).
pub const DEFAULT_FIREBASE_API_KEY: Option<&str> = option_env!("PULSE_FIREBASE_API_KEY");

/// Identity Toolkit endpoint used for password sign-in.
pub const DEFAULT_FIREBASE_AUTH_URL: &str = "https://identitytoolkit.googleapis.com";

/// Secure Token endpoint used for ID token refresh.
pub const DEFAULT_FIREBASE_TOKEN_URL: &str = "https://securetoken.googleapis.com";

/// Default log level.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Identity provider settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IdentityConfig {
    /// Administrative switch; when false the client runs degraded.
    #[serde(default = "default_identity_enabled")]
    pub enabled: bool,
    /// Firebase Web API key.
    #[serde(default = "default_firebase_api_key")]
    pub api_key: Option<String>,
    /// Identity Toolkit base URL.
    #[serde(default = "default_auth_url")]
    pub auth_url: String,
    /// Secure Token base URL.
    #[serde(default = "default_token_url")]
    pub token_url: String,
}

/// Realtime channel reconnection settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RealtimeSettings {
    /// First reconnect delay in milliseconds.
    pub reconnect_base_delay_ms: u64,
    /// Reconnect delay cap in milliseconds.
    pub reconnect_max_delay_ms: u64,
    /// Reconnect attempts before giving up; `None` retries forever.
    pub max_reconnect_attempts: Option<u32>,
    /// Connection is considered dead after this long without a server ping.
    pub ping_timeout_secs: u64,
}

/// Session manager settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionSettings {
    /// How long `login` waits for the session to become ready.
    pub settle_timeout_secs: u64,
}

/// Main client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Log level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
    /// Backend API URL, normalised through [`api_base_url`] before use.
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default)]
    pub realtime: RealtimeSettings,
    #[serde(default)]
    pub session: SessionSettings,
}

fn default_log_level() -> String {
    DEFAULT_LOG_LEVEL.to_string()
}

fn default_api_url() -> String {
    DEFAULT_API_URL.to_string()
}

fn default_identity_enabled() -> bool {
    match option_env!("PULSE_FIREBASE_ENABLED") {
        Some(value) => parse_bool(value).unwrap_or(true),
        None => true,
    }
}

fn default_firebase_api_key() -> Option<String> {
    DEFAULT_FIREBASE_API_KEY.map(|s| s.to_string())
}

fn default_auth_url() -> String {
    DEFAULT_FIREBASE_AUTH_URL.to_string()
}

fn default_token_url() -> String {
    DEFAULT_FIREBASE_TOKEN_URL.to_string()
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            enabled: default_identity_enabled(),
            api_key: default_firebase_api_key(),
            auth_url: default_auth_url(),
            token_url: default_token_url(),
        }
    }
}

impl Default for RealtimeSettings {
    fn default() -> Self {
        Self {
            reconnect_base_delay_ms: 1_000,
            reconnect_max_delay_ms: 5_000,
            max_reconnect_attempts: None,
            ping_timeout_secs: 45,
        }
    }
}

impl Default for SessionSettings {
    fn default() -> Self {
        Self {
            settle_timeout_secs: 30,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            log_level: DEFAULT_LOG_LEVEL.to_string(),
            api_url: DEFAULT_API_URL.to_string(),
            identity: IdentityConfig::default(),
            realtime: RealtimeSettings::default(),
            session: SessionSettings::default(),
        }
    }
}

impl Config {
    /// Create a new Config with default values, then override from environment.
    pub fn new() -> Self {
        let mut config = Self::default();
        config.load_from_env();
        config
    }

    /// Load configuration from the config file (if any), then apply environment overrides.
    pub fn load(paths: &Paths) -> ConfigResult<Self> {
        let config_path = paths.config_file();

        let mut config = if config_path.exists() {
            Self::load_from_file(&config_path)?
        } else {
            Self::default()
        };

        config.load_from_env();

        Ok(config)
    }

    /// Load configuration from a specific file.
    pub fn load_from_file(path: &Path) -> ConfigResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        serde_json::from_str(&content).map_err(|source| ConfigError::Parse {
            path: path.to_path_buf(),
            source,
        })
    }

    /// Save configuration to a file.
    pub fn save(&self, paths: &Paths) -> ConfigResult<()> {
        paths.ensure_dirs()?;
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(paths.config_file(), content)?;
        Ok(())
    }

    fn load_from_env(&mut self) {
        self.apply_env_overrides(|name| std::env::var(name).ok());
    }

    /// Apply `PULSE_*` overrides using the given variable lookup.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        let lookup = |name: &str| lookup(name).and_then(non_empty);

        if let Some(level) = lookup("PULSE_LOG_LEVEL") {
            self.log_level = level;
        }
        if let Some(url) = lookup("PULSE_API_URL") {
            self.api_url = url;
        }
        if let Some(enabled) = lookup("PULSE_FIREBASE_ENABLED").and_then(|v| parse_bool(&v)) {
            self.identity.enabled = enabled;
        }
        if let Some(key) = lookup("PULSE_FIREBASE_API_KEY") {
            self.identity.api_key = Some(key);
        }
    }

    /// Normalised backend API base URL (always ends in `/api`).
    pub fn api_base_url(&self) -> String {
        api_base_url(&self.api_url)
    }

    /// Realtime server base URL (API base without the `/api` suffix).
    pub fn realtime_base_url(&self) -> String {
        realtime_base_url(&self.api_base_url())
    }

    /// Get the API base URL as a parsed URL.
    pub fn parsed_api_url(&self) -> ConfigResult<Url> {
        let value = self.api_base_url();
        Url::parse(&value).map_err(|source| ConfigError::InvalidUrl { value, source })
    }
}

/// Normalise a raw API URL: empty falls back to the default, one trailing
/// slash is dropped and `/api` is appended when missing.
pub fn api_base_url(raw: &str) -> String {
    let raw = raw.trim();
    let raw = if raw.is_empty() { DEFAULT_API_URL } else { raw };
    let sanitized = raw.strip_suffix('/').unwrap_or(raw);

    if sanitized.ends_with("/api") {
        sanitized.to_string()
    } else {
        format!("{}/api", sanitized)
    }
}

/// Strip the trailing `/api` segment from a normalised API base URL.
pub fn realtime_base_url(api_base: &str) -> String {
    api_base.strip_suffix("/api").unwrap_or(api_base).to_string()
}

fn non_empty(raw: String) -> Option<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" | "on" => Some(true),
        "false" | "0" | "no" | "off" => Some(false),
        _ => None,
    }
}
