//! Append-only JSONL log file.
//!
//! Several client processes may append to the same file; each line is
//! written with a single `write` on an `O_APPEND` handle, so lines from
//! different processes never interleave.

use crate::json_layer::JsonLayer;
use crate::LogConfig;
use parking_lot::Mutex;
use std::fs::{File, OpenOptions};
use std::io::{self, LineWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::fmt::MakeWriter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{EnvFilter, Layer};

/// Past this size the file is moved to `<name>.1` when a process starts.
pub(crate) const ROTATE_AT_BYTES: u64 = 10 * 1024 * 1024;

/// `~/.quality-pulse/logs/client.jsonl`, or under the temp dir without a home.
pub(crate) fn default_log_path() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join(".quality-pulse")
        .join("logs")
        .join("client.jsonl")
}

fn rotated_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_os_string();
    name.push(".1");
    PathBuf::from(name)
}

/// Shared handle to the open log file.
#[derive(Clone)]
pub(crate) struct LogFile {
    file: Arc<Mutex<LineWriter<File>>>,
}

impl LogFile {
    pub(crate) fn open(path: &Path, rotate_at: u64) -> io::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let oversized = std::fs::metadata(path)
            .map(|meta| meta.len() >= rotate_at)
            .unwrap_or(false);
        if oversized {
            std::fs::rename(path, rotated_path(path))?;
        }

        let mut options = OpenOptions::new();
        options.create(true).append(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            // Lines carry account emails.
            options.mode(0o600);
        }

        Ok(Self {
            file: Arc::new(Mutex::new(LineWriter::new(options.open(path)?))),
        })
    }
}

impl Write for LogFile {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.file.lock().write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.file.lock().flush()
    }
}

impl<'a> MakeWriter<'a> for LogFile {
    type Writer = LogFile;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

fn env_filter(config: &LogConfig) -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level))
}

/// Install the JSONL file layer plus the optional stderr layer. Returns the
/// log file path.
pub(crate) fn init_file_subscriber(config: &LogConfig) -> io::Result<PathBuf> {
    let log_path = config.resolved_log_path();
    let log_file = LogFile::open(&log_path, ROTATE_AT_BYTES)?;
    let json_layer = JsonLayer::new(config.service.clone(), log_file);
    let stderr = config.also_stderr.then(|| {
        tracing_subscriber::fmt::layer()
            .compact()
            .without_time()
            .with_writer(io::stderr)
    });

    let _ = tracing_subscriber::registry()
        .with(json_layer.with_filter(env_filter(config)))
        .with(stderr.map(|l| l.with_filter(env_filter(config))))
        .try_init();

    tracing::debug!(
        path = %log_path.display(),
        service = %config.service,
        "Logging to file"
    );
    Ok(log_path)
}

pub(crate) fn init_stderr_subscriber(config: &LogConfig) {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(env_filter(config))
        .with_writer(io::stderr)
        .compact()
        .without_time()
        .finish()
        .try_init();
}
