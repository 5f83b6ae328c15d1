//! Conversion orchestration for a cache miss.
//!
//! [`Materializer::materialize`] produces one artifact and publishes it:
//!
//! 1. Acquire a [`Workspace`]
//! 2. Fetch the source into the workspace if the engine cannot read it remotely
//! 3. Run the conversion engine
//! 4. Reject missing or zero-byte output
//! 5. Zip directory output into a single archive
//! 6. Publish the bytes under the target key
//! 7. Return the cache-busted target URL
//!
//! Nothing is published unless every earlier step succeeded, so a failed
//! conversion never leaves a partial or empty object in the cache.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::dataset::DatasetRef;
use crate::engine::{ConversionEngine, ConversionRequest, EngineError, SourceLocation};
use crate::error::{GatewayError, GatewayResult};
use crate::format::{FormatSpec, NATIVE_SUFFIX};
use crate::keys::{cache_bust_token, with_cache_bust, CacheKeys};
use crate::options::ConversionOptions;
use crate::package::{measure_output, package_directory};
use crate::store::ObjectStore;
use crate::workspace::Workspace;

/// HTTP status a remote engine uses to report an empty result.
const REMOTE_EMPTY_STATUS: u16 = 422;

/// Everything needed to build one artifact.
#[derive(Debug, Clone)]
pub struct MaterializeJob {
    pub dataset: DatasetRef,
    pub format: FormatSpec,
    pub options: ConversionOptions,
    pub keys: CacheKeys,
}

/// Runs conversions and publishes their output.
#[derive(Clone)]
pub struct Materializer {
    engine: Arc<dyn ConversionEngine>,
    assets: Arc<dyn ObjectStore>,
    cache: Arc<dyn ObjectStore>,
    work_dir: PathBuf,
}

impl Materializer {
    pub fn new(
        engine: Arc<dyn ConversionEngine>,
        assets: Arc<dyn ObjectStore>,
        cache: Arc<dyn ObjectStore>,
        work_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            engine,
            assets,
            cache,
            work_dir: work_dir.into(),
        }
    }

    /// Convert, validate, package and publish one artifact.
    ///
    /// # Returns
    ///
    /// The target URL with a fresh cache-busting token, only after the put
    /// has completed.
    #[instrument(
        skip(self, job, cancel),
        fields(key = %job.keys.target_key, engine = self.engine.name())
    )]
    pub async fn materialize(
        &self,
        job: &MaterializeJob,
        cancel: CancellationToken,
    ) -> GatewayResult<String> {
        let workspace = Workspace::create_in(&self.work_dir)?;
        let layer = job.dataset.layer_name();

        let source = if self.engine.reads_remote_sources() {
            SourceLocation::Url(self.assets.public_url(&job.keys.source_key))
        } else {
            let path = workspace.join(format!("{}.{}", layer, NATIVE_SUFFIX));
            self.fetch_source(&job.keys.source_key, &path, &cancel).await?;
            SourceLocation::Path(path)
        };

        let destination =
            workspace.join(format!("{}.{}", layer, job.format.engine_output_suffix()));
        let request = ConversionRequest {
            dataset: job.dataset.clone(),
            format: job.format.clone(),
            options: job.options.clone(),
            source,
            destination: destination.clone(),
        };

        debug!(destination = %destination.display(), "Running conversion");
        self.engine
            .convert(&request, cancel.clone())
            .await
            .map_err(|e| map_engine_error(&job.keys.target_key, e))?;

        let size = measure_output(&destination).map_err(|e| {
            if destination.is_dir() {
                GatewayError::PackagingFailed(format!("unreadable output member: {}", e))
            } else {
                GatewayError::Workspace(format!("cannot inspect output: {}", e))
            }
        })?;
        match size {
            None | Some(0) => {
                warn!("Conversion produced no data, nothing published");
                return Err(GatewayError::ConversionProducedEmptyOutput(
                    job.keys.target_key.clone(),
                ));
            }
            Some(bytes) => debug!(output_bytes = bytes, "Conversion output measured"),
        }

        let artifact = if destination.is_dir() {
            let archive = workspace.join(format!(
                "{}.{}.zip",
                layer,
                job.format.engine_output_suffix()
            ));
            let dir = destination.clone();
            let target = archive.clone();
            let archive_bytes =
                tokio::task::spawn_blocking(move || package_directory(&dir, &target))
                    .await
                    .map_err(|e| GatewayError::PackagingFailed(e.to_string()))??;
            debug!(archive_bytes, "Directory output packaged");
            archive
        } else {
            destination
        };

        let body = Bytes::from(tokio::fs::read(&artifact).await?);
        let published = body.len();
        let put = self.cache.put(&job.keys.target_key, body);
        tokio::select! {
            result = put => result.map_err(|e| GatewayError::PublishFailed {
                key: job.keys.target_key.clone(),
                reason: e.to_string(),
            })?,
            _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
        }

        info!(size_bytes = published, "Artifact published");
        let url = self.cache.public_url(&job.keys.target_key);
        Ok(with_cache_bust(&url, &cache_bust_token()))
    }

    async fn fetch_source(
        &self,
        key: &str,
        path: &std::path::Path,
        cancel: &CancellationToken,
    ) -> GatewayResult<()> {
        let upstream = |reason: String| GatewayError::UpstreamUnavailable {
            key: key.to_string(),
            reason,
        };

        let body = tokio::select! {
            result = self.assets.get(key) => result.map_err(|e| upstream(e.to_string()))?,
            _ = cancel.cancelled() => return Err(GatewayError::Cancelled),
        };
        if body.is_empty() {
            return Err(upstream("source object is empty".to_string()));
        }

        tokio::fs::write(path, &body).await?;
        debug!(key = %key, size_bytes = body.len(), "Source fetched");
        Ok(())
    }
}

fn map_engine_error(key: &str, error: EngineError) -> GatewayError {
    match error {
        EngineError::Cancelled => GatewayError::Cancelled,
        EngineError::Remote { status, .. } if status == REMOTE_EMPTY_STATUS => {
            GatewayError::ConversionProducedEmptyOutput(key.to_string())
        }
        EngineError::Failed {
            ref status,
            ref diagnostics,
        } => {
            warn!(status = %status, diagnostics = %diagnostics, "Conversion engine failed");
            GatewayError::ConversionEngineFailed(error.to_string())
        }
        other => GatewayError::ConversionEngineFailed(other.to_string()),
    }
}
