//! Client file locations.
//!
//! Everything lives under one base directory, `~/.quality-pulse` unless
//! `PULSE_HOME` points elsewhere.

use crate::{ConfigError, ConfigResult};
use std::path::{Path, PathBuf};

const BASE_DIR_NAME: &str = ".quality-pulse";
const HOME_OVERRIDE_VAR: &str = "PULSE_HOME";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Paths {
    base_dir: PathBuf,
}

impl Paths {
    /// Resolve from `PULSE_HOME`, falling back to the user's home directory.
    pub fn new() -> ConfigResult<Self> {
        Self::resolve(|name| std::env::var(name).ok(), dirs::home_dir())
    }

    /// Resolve with an explicit variable lookup and home directory.
    pub fn resolve<F>(lookup: F, home: Option<PathBuf>) -> ConfigResult<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let override_dir = lookup(HOME_OVERRIDE_VAR)
            .map(|raw| raw.trim().to_string())
            .filter(|raw| !raw.is_empty());

        match (override_dir, home) {
            (Some(dir), _) => Ok(Self::with_base_dir(PathBuf::from(dir))),
            (None, Some(home)) => Ok(Self::with_base_dir(home.join(BASE_DIR_NAME))),
            (None, None) => Err(ConfigError::NoHomeDir),
        }
    }

    pub fn with_base_dir(base_dir: PathBuf) -> Self {
        Self { base_dir }
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn config_file(&self) -> PathBuf {
        self.base_dir.join("config.json")
    }

    /// Persisted identity session (refresh token and user), read on startup
    /// to restore the previous sign-in.
    pub fn identity_session_file(&self) -> PathBuf {
        self.base_dir.join("identity-session.json")
    }

    pub fn logs_dir(&self) -> PathBuf {
        self.base_dir.join("logs")
    }

    pub fn log_file(&self) -> PathBuf {
        self.logs_dir().join("client.jsonl")
    }

    pub fn ensure_dirs(&self) -> ConfigResult<()> {
        std::fs::create_dir_all(self.logs_dir())?;
        Ok(())
    }
}
