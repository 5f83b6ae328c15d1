//! Tracing subscriber setup.
//!
//! Installs a stderr formatter with local-time timestamps and, optionally,
//! a non-blocking file writer. The filter comes from `RUST_LOG` when set,
//! otherwise from [`LoggingConfig::default_directive`].

use std::path::PathBuf;

use thiserror::Error;
pub use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::LocalTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::{fmt, EnvFilter};

/// Errors raised while installing the subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("invalid log filter '{directive}': {reason}")]
    InvalidFilter { directive: String, reason: String },

    #[error("cannot create log directory {path}: {reason}")]
    LogDirectory { path: PathBuf, reason: String },

    #[error("a global tracing subscriber is already installed")]
    AlreadyInitialized,
}

/// Logging options.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter used when `RUST_LOG` is unset, e.g. `info` or `codgate=debug`.
    pub default_directive: String,
    /// Also write logs to `{dir}/codgate.log`.
    pub file_dir: Option<PathBuf>,
    /// Include the event target (module path) in stderr output.
    pub with_target: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            default_directive: "info".to_string(),
            file_dir: None,
            with_target: false,
        }
    }
}

impl LoggingConfig {
    /// Default config with `verbose` switching the default filter to debug.
    pub fn verbose(verbose: bool) -> Self {
        let mut config = Self::default();
        if verbose {
            config.default_directive = "codgate=debug,info".to_string();
            config.with_target = true;
        }
        config
    }

    pub fn with_file_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.file_dir = Some(dir.into());
        self
    }

    fn filter(&self) -> Result<EnvFilter, LoggingError> {
        if let Ok(filter) = EnvFilter::try_from_default_env() {
            return Ok(filter);
        }
        EnvFilter::try_new(&self.default_directive).map_err(|e| LoggingError::InvalidFilter {
            directive: self.default_directive.clone(),
            reason: e.to_string(),
        })
    }
}

/// Install the global subscriber.
///
/// The returned guard flushes the file writer when dropped and must be kept
/// alive for the life of the process. It is `None` without a file layer.
pub fn init_logging(config: &LoggingConfig) -> Result<Option<WorkerGuard>, LoggingError> {
    let filter = config.filter()?;

    let stderr_layer = fmt::layer()
        .with_timer(LocalTime::rfc_3339())
        .with_target(config.with_target)
        .with_writer(std::io::stderr);

    let (file_layer, guard) = match &config.file_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| LoggingError::LogDirectory {
                path: dir.clone(),
                reason: e.to_string(),
            })?;
            let appender = tracing_appender::rolling::daily(dir, "codgate.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .with_timer(LocalTime::rfc_3339())
                .with_ansi(false)
                .with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(stderr_layer)
        .with(file_layer)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    Ok(guard)
}
