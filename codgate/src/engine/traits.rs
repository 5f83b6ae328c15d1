//! Conversion engine interface.

use std::path::PathBuf;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::dataset::DatasetRef;
use crate::format::FormatSpec;
use crate::options::ConversionOptions;
use crate::store::BoxFuture;

/// Where the engine reads the canonical source from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceLocation {
    /// Network URL the engine opens itself.
    Url(String),
    /// File already fetched into the job workspace.
    Path(PathBuf),
}

/// Everything an engine needs to run one conversion.
#[derive(Debug, Clone)]
pub struct ConversionRequest {
    pub dataset: DatasetRef,
    pub format: FormatSpec,
    pub options: ConversionOptions,
    pub source: SourceLocation,
    /// Path the engine must write to (file or directory).
    pub destination: PathBuf,
}

impl ConversionRequest {
    /// Output layer name, `{region}_adm{level}`.
    pub fn layer_name(&self) -> String {
        self.dataset.layer_name()
    }
}

/// Errors reported by a conversion engine.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    /// The engine process could not be started.
    #[error("failed to start {program}: {reason}")]
    Spawn { program: String, reason: String },

    /// The engine ran and reported failure.
    #[error("engine exited with {status}: {diagnostics}")]
    Failed { status: String, diagnostics: String },

    /// A remote engine answered with an error status.
    #[error("remote engine returned HTTP {status} for {url}")]
    Remote { status: u16, url: String },

    /// A remote engine could not be reached.
    #[error("remote engine unreachable: {0}")]
    Transport(String),

    /// Writing the engine output locally failed.
    #[error("I/O error: {0}")]
    Io(String),

    /// The conversion was cancelled before it finished.
    #[error("conversion cancelled")]
    Cancelled,
}

impl From<std::io::Error> for EngineError {
    fn from(e: std::io::Error) -> Self {
        EngineError::Io(e.to_string())
    }
}

/// A pluggable vector-format converter.
///
/// The gateway treats the engine as opaque: it trusts only the reported
/// success and then checks the destination itself for a non-empty result.
pub trait ConversionEngine: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Whether the engine can open source URLs directly.
    ///
    /// When `false` the orchestrator downloads the source into the job
    /// workspace and passes a [`SourceLocation::Path`].
    fn reads_remote_sources(&self) -> bool;

    /// Run one conversion, writing to `request.destination`.
    ///
    /// Must stop promptly (and release any child process) once `cancel`
    /// fires.
    fn convert<'a>(
        &'a self,
        request: &'a ConversionRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<(), EngineError>>;
}
