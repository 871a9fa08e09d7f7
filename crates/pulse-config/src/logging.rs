//! Logging bootstrap for client binaries.

use crate::{ConfigError, ConfigResult, Paths};
use observability::{LogConfig, LogTarget};
use std::str::FromStr;
use tracing::Level;

/// Parse a level name. Accepts the `tracing` names in any case plus `warning`.
pub fn parse_level(raw: &str) -> ConfigResult<Level> {
    let trimmed = raw.trim();
    if trimmed.eq_ignore_ascii_case("warning") {
        return Ok(Level::WARN);
    }
    if trimmed.is_empty() || trimmed.bytes().all(|b| b.is_ascii_digit()) {
        return Err(ConfigError::InvalidLogLevel(raw.to_string()));
    }
    Level::from_str(trimmed).map_err(|_| ConfigError::InvalidLogLevel(raw.to_string()))
}

/// Route `tracing` output for this process into `paths.log_file()`.
///
/// `RUST_LOG`, when set, replaces `level` as the filter.
pub fn init_logging(service: &str, level: Level, paths: &Paths, also_stderr: bool) -> LogTarget {
    observability::init(
        LogConfig::new(service)
            .with_level(level.as_str().to_ascii_lowercase())
            .with_log_path(paths.log_file())
            .with_stderr(also_stderr),
    )
}
