//! Logging configuration and subscriber setup.
//!
//! `tracing` events go to stderr, as text or one JSON object per line,
//! optionally teed into `<logs_dir>/pix.log`. `RUST_LOG` overrides the
//! configured level when set.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs::OpenOptions;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::{BoxMakeWriter, MakeWriterExt};
use tracing_subscriber::EnvFilter;

/// File name of the log inside `paths.logs_dir`.
pub const LOG_FILE_NAME: &str = "pix.log";

/// Log output format
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogFormat {
    #[default]
    Text,
    Json,
}

/// Log severity level
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LogLevel {
    Trace,
    Debug,
    #[default]
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Trace => "trace",
            Self::Debug => "debug",
            Self::Info => "info",
            Self::Warn => "warn",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// `[logging]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct LoggingConfig {
    #[serde(default)]
    pub format: LogFormat,
    #[serde(default)]
    pub level: LogLevel,
    /// Also append to `<logs_dir>/pix.log`.
    #[serde(default)]
    pub file: bool,
}

impl LoggingConfig {
    pub fn file_path(&self, logs_dir: &Path) -> Option<PathBuf> {
        self.file.then(|| logs_dir.join(LOG_FILE_NAME))
    }
}

/// Install the global subscriber. Call once, before any other work.
pub fn init(config: &LoggingConfig, logs_dir: &Path) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.as_str()));

    let writer = match config.file_path(logs_dir) {
        Some(path) => {
            std::fs::create_dir_all(logs_dir)
                .with_context(|| format!("Failed to create log directory {}", logs_dir.display()))?;
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(&path)
                .with_context(|| format!("Failed to open log file {}", path.display()))?;
            BoxMakeWriter::new(std::io::stderr.and(Mutex::new(file)))
        }
        None => BoxMakeWriter::new(std::io::stderr),
    };

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_ansi(!config.file && atty::is(atty::Stream::Stderr))
        .with_writer(writer);

    let installed = match config.format {
        LogFormat::Text => tracing::subscriber::set_global_default(builder.finish()),
        LogFormat::Json => tracing::subscriber::set_global_default(builder.json().finish()),
    };
    if installed.is_err() {
        tracing::warn!("Tracing subscriber already set; skipping re-initialization.");
    }
    Ok(())
}
