//! CLI error type.

use std::fmt;

use codgate::logging::LoggingError;
use codgate::{ConfigError, GatewayError};

/// Errors that end a CLI command with exit status 1.
#[derive(Debug)]
pub enum CliError {
    /// Configuration could not be loaded or is invalid.
    Config(String),
    /// Logging could not be installed.
    Logging(String),
    /// The async runtime could not be created.
    Runtime(String),
    /// Invalid command-line arguments not caught by clap.
    Args(String),
    /// The HTTP server failed to bind or stopped with an error.
    Serve(String),
    /// A resolution failed.
    Resolve(GatewayError),
    /// Prewarm finished with failures.
    Prewarm { failed: usize, planned: usize },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(msg) => write!(f, "Logging error: {}", msg),
            CliError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
            CliError::Args(msg) => write!(f, "Invalid arguments: {}", msg),
            CliError::Serve(msg) => write!(f, "Server error: {}", msg),
            CliError::Resolve(e) => write!(f, "{} (HTTP {})", e, e.status_code()),
            CliError::Prewarm { failed, planned } => {
                write!(f, "Prewarm failed for {} of {} items", failed, planned)
            }
        }
    }
}

impl std::error::Error for CliError {}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e.to_string())
    }
}

impl From<GatewayError> for CliError {
    fn from(e: GatewayError) -> Self {
        CliError::Resolve(e)
    }
}
