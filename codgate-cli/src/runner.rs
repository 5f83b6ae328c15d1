//! Shared command setup: configuration, logging and the async runtime.

use std::path::PathBuf;

use codgate::logging::{init_logging, LoggingConfig, WorkerGuard};
use codgate::{Gateway, GatewayConfig};
use tracing::info;

use crate::error::CliError;

/// Global options every command accepts.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub verbose: bool,
    pub log_dir: Option<PathBuf>,
}

/// Loaded configuration plus the runtime commands execute on.
pub struct CliRunner {
    config: GatewayConfig,
    runtime: tokio::runtime::Runtime,
    _log_guard: Option<WorkerGuard>,
}

impl CliRunner {
    /// Install logging, load configuration and build the runtime.
    pub fn new(options: &GlobalOptions) -> Result<Self, CliError> {
        let mut logging = LoggingConfig::verbose(options.verbose);
        if let Some(dir) = &options.log_dir {
            logging = logging.with_file_dir(dir);
        }
        let log_guard = init_logging(&logging)?;

        let config = GatewayConfig::load(options.config.as_deref())?;

        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("codgate-worker")
            .build()
            .map_err(|e| CliError::Runtime(e.to_string()))?;

        Ok(Self {
            config,
            runtime,
            _log_guard: log_guard,
        })
    }

    pub fn config(&self) -> &GatewayConfig {
        &self.config
    }

    pub fn config_mut(&mut self) -> &mut GatewayConfig {
        &mut self.config
    }

    pub fn runtime(&self) -> &tokio::runtime::Runtime {
        &self.runtime
    }

    /// Build a gateway from the loaded configuration.
    pub fn gateway(&self) -> Result<Gateway, CliError> {
        // Store clients register with the runtime's reactor
        let _enter = self.runtime.enter();
        Ok(Gateway::from_config(&self.config)?)
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            command,
            version = codgate::VERSION,
            engine = self.config.engine.kind(),
            work_dir = %self.config.work_dir.display(),
            "codgate starting"
        );
    }
}
