//! Tracing setup for the `mcplink` binaries.
//!
//! Logs go to stderr by default so they never mix with protocol traffic on
//! stdout. Set `MCPLINK_LOG_FILE` to write to a file instead (rotated on
//! each start) and `MCPLINK_LOG_FORMAT=json` for structured output.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use thiserror::Error;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::EnvFilter;

/// Filter used when `RUST_LOG` is unset.
pub const DEFAULT_FILTER: &str = "mcplink=info,warn";

/// Rotated log files kept next to the active one.
const KEEP_ROTATED_LOGS: u32 = 3;

#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("failed to open log file {path}: {reason}")]
    OpenLog { path: String, reason: String },

    #[error("tracing subscriber already installed: {reason}")]
    AlreadyInitialized { reason: String },
}

/// Output encoding for log lines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

impl LogFormat {
    pub fn parse(value: &str) -> Self {
        if value.trim().eq_ignore_ascii_case("json") {
            Self::Json
        } else {
            Self::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogOptions {
    pub format: LogFormat,
    /// Write here instead of stderr.
    pub file: Option<PathBuf>,
    pub default_filter: String,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            format: LogFormat::Text,
            file: None,
            default_filter: DEFAULT_FILTER.to_string(),
        }
    }
}

impl LogOptions {
    /// Read `MCPLINK_LOG_FORMAT` and `MCPLINK_LOG_FILE`.
    pub fn from_env() -> Self {
        Self {
            format: std::env::var("MCPLINK_LOG_FORMAT")
                .map(|v| LogFormat::parse(&v))
                .unwrap_or_default(),
            file: std::env::var("MCPLINK_LOG_FILE")
                .ok()
                .filter(|v| !v.trim().is_empty())
                .map(|v| PathBuf::from(crate::config::expand_tilde(&v))),
            ..Self::default()
        }
    }
}

/// Install the global tracing subscriber.
pub fn init_tracing(options: &LogOptions) -> Result<(), LoggingError> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.default_filter));

    let (writer, ansi) = match &options.file {
        Some(path) => (BoxMakeWriter::new(open_log_file(path)?), false),
        None => (BoxMakeWriter::new(std::io::stderr), true),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(ansi)
        .with_target(true)
        .with_thread_ids(false);

    let installed = match options.format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|e| LoggingError::AlreadyInitialized {
        reason: e.to_string(),
    })?;

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        log_file = ?options.file,
        pid = std::process::id(),
        "logging initialized"
    );
    Ok(())
}

fn open_log_file(path: &Path) -> Result<FlushingWriter, LoggingError> {
    let open_error = |e: std::io::Error| LoggingError::OpenLog {
        path: path.display().to_string(),
        reason: e.to_string(),
    };

    if let Some(dir) = path.parent().filter(|d| !d.as_os_str().is_empty()) {
        std::fs::create_dir_all(dir).map_err(open_error)?;
    }
    rotate_log_file(path, KEEP_ROTATED_LOGS);

    let file = std::fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(open_error)?;
    Ok(FlushingWriter::new(file))
}

/// Rotate log files: `mcplink.log` becomes `mcplink.log.1`, and so on up to `.{keep}`.
///
/// The oldest file beyond `keep` is deleted. Missing files are skipped.
fn rotate_log_file(base_path: &Path, keep: u32) {
    let numbered = |i: u32| PathBuf::from(format!("{}.{i}", base_path.display()));

    let _ = std::fs::remove_file(numbered(keep));
    for i in (1..keep).rev() {
        let _ = std::fs::rename(numbered(i), numbered(i + 1));
    }
    if base_path.exists() {
        let _ = std::fs::rename(base_path, numbered(1));
    }
}

/// A file writer that flushes after every write, so lines survive a crash.
#[derive(Clone)]
struct FlushingWriter {
    file: Arc<Mutex<std::fs::File>>,
}

impl FlushingWriter {
    fn new(file: std::fs::File) -> Self {
        Self {
            file: Arc::new(Mutex::new(file)),
        }
    }
}

impl Write for FlushingWriter {
    fn write(&mut self, buf: &[u8]) -> std::io::Result<usize> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        let n = f.write(buf)?;
        f.flush()?;
        Ok(n)
    }

    fn flush(&mut self) -> std::io::Result<()> {
        let mut f = self
            .file
            .lock()
            .map_err(|e| std::io::Error::other(format!("lock poisoned: {e}")))?;
        f.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for FlushingWriter {
    type Writer = FlushingWriter;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}
