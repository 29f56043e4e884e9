//! Logging setup.
//!
//! Counters are emitted through the `metrics` facade throughout the crate;
//! installing a recorder is left to the embedding application.

mod logging;

pub use logging::{LogFormat, LoggingConfig, LoggingSettings};

use crate::{Error, Result};
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

static LOGGING_INIT: OnceLock<()> = OnceLock::new();

/// Initializes logging from environment variables.
///
/// # Errors
///
/// Returns an error if logging has already been initialized.
pub fn init_from_env(verbose: bool) -> Result<()> {
    init(LoggingConfig::from_env(verbose))
}

/// Initializes logging from config settings with env overrides.
///
/// # Errors
///
/// Returns an error if logging has already been initialized or the log file
/// cannot be opened.
pub fn init_from_settings(settings: Option<&LoggingSettings>, verbose: bool) -> Result<()> {
    init(LoggingConfig::from_settings(settings, verbose))
}

/// Installs the global subscriber.
///
/// Without a log file, events go to stderr so that stdout stays reserved
/// for exported data.
///
/// # Errors
///
/// Returns an error if logging has already been initialized or the log file
/// cannot be opened.
pub fn init(config: LoggingConfig) -> Result<()> {
    if LOGGING_INIT.get().is_some() {
        return Err(already_initialized());
    }

    match (&config.file, config.format) {
        (Some(log_file), LogFormat::Json) => {
            let writer = open_log_file(log_file)?;
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(writer)
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true),
                )
                .with(config.filter)
                .try_init()
                .map_err(init_error)?;
        },
        (Some(log_file), LogFormat::Pretty) => {
            let writer = open_log_file(log_file)?;
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .with_writer(writer)
                        .with_ansi(false)
                        .with_target(true),
                )
                .with(config.filter)
                .try_init()
                .map_err(init_error)?;
        },
        (None, LogFormat::Json) => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .json()
                        .with_writer(io::stderr)
                        .with_current_span(true)
                        .with_span_list(true)
                        .with_target(true),
                )
                .with(config.filter)
                .try_init()
                .map_err(init_error)?;
        },
        (None, LogFormat::Pretty) => {
            tracing_subscriber::registry()
                .with(
                    tracing_subscriber::fmt::layer()
                        .compact()
                        .with_writer(io::stderr)
                        .with_target(false),
                )
                .with(config.filter)
                .try_init()
                .map_err(init_error)?;
        },
    }

    LOGGING_INIT.set(()).map_err(|()| already_initialized())
}

/// Thread-safe file writer for logging.
#[derive(Clone)]
struct LogFileWriter {
    file: Arc<Mutex<File>>,
}

impl Write for LogFileWriter {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        let mut guard = self
            .file
            .lock()
            .map_err(|e| io::Error::other(e.to_string()))?;
        guard.flush()
    }
}

impl<'a> tracing_subscriber::fmt::MakeWriter<'a> for LogFileWriter {
    type Writer = Self;

    fn make_writer(&'a self) -> Self::Writer {
        self.clone()
    }
}

/// Opens a log file for appending, creating parent directories.
fn open_log_file(path: &Path) -> Result<LogFileWriter> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).map_err(|e| Error::OperationFailed {
            operation: "create_log_dir".to_string(),
            cause: e.to_string(),
        })?;
    }

    let file = OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)
        .map_err(|e| Error::OperationFailed {
            operation: "open_log_file".to_string(),
            cause: format!("{}: {}", path.display(), e),
        })?;

    Ok(LogFileWriter {
        file: Arc::new(Mutex::new(file)),
    })
}

fn already_initialized() -> Error {
    Error::OperationFailed {
        operation: "logging_init".to_string(),
        cause: "logging already initialized".to_string(),
    }
}

#[allow(clippy::needless_pass_by_value)]
fn init_error(e: tracing_subscriber::util::TryInitError) -> Error {
    Error::OperationFailed {
        operation: "logging_init".to_string(),
        cause: e.to_string(),
    }
}
