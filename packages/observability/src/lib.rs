//! # Observability
//!
//! Logging setup shared by the Quality Pulse client crates.
//!
//! Library crates only emit through the `tracing` macros. The binary calls
//! [`init`] once; every event then lands as one JSON line in
//! `~/.quality-pulse/logs/client.jsonl` (see [`json_layer`] for the line
//! format and credential redaction), optionally mirrored to stderr.
//!
//! ```rust,ignore
//! let target = observability::init(LogConfig::new("cli").with_level("debug"));
//! tracing::info!(?target, "client started");
//! ```

mod file_sink;
pub mod json_layer;

pub use json_layer::{JsonLayer, LogEntry, REDACTED};

use std::path::PathBuf;

/// Logging settings for one process.
#[derive(Debug, Clone)]
pub struct LogConfig {
    /// Written into every line as `service`.
    pub service: String,
    /// Filter directive used when `RUST_LOG` is unset.
    pub level: String,
    /// Defaults to `~/.quality-pulse/logs/client.jsonl`.
    pub log_path: Option<PathBuf>,
    pub also_stderr: bool,
}

impl LogConfig {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            level: "info".to_string(),
            log_path: None,
            also_stderr: false,
        }
    }

    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_log_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.log_path = Some(path.into());
        self
    }

    pub fn with_stderr(mut self, also_stderr: bool) -> Self {
        self.also_stderr = also_stderr;
        self
    }

    /// The file the JSONL layer appends to.
    pub fn resolved_log_path(&self) -> PathBuf {
        self.log_path
            .clone()
            .unwrap_or_else(file_sink::default_log_path)
    }
}

/// Where log lines ended up after [`init`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogTarget {
    File(PathBuf),
    /// The log file could not be opened.
    StderrOnly,
}

/// Install the global subscriber.
///
/// Falls back to stderr when the log file cannot be opened, so a read-only
/// home directory never keeps the client from starting. A second call in the
/// same process leaves the first subscriber in place.
pub fn init(config: LogConfig) -> LogTarget {
    match file_sink::init_file_subscriber(&config) {
        Ok(path) => LogTarget::File(path),
        Err(err) => {
            file_sink::init_stderr_subscriber(&config);
            tracing::warn!(error = %err, "Log file unavailable, logging to stderr only");
            LogTarget::StderrOnly
        }
    }
}
