//! Request resolution.
//!
//! [`Gateway::resolve`] turns a [`FeatureRequest`] into a URL the client can
//! fetch:
//!
//! ```text
//! normalize ─► keys ─► native? ──yes──► source URL
//!                        │no
//!                        ▼
//!                  probe target ──present──► canonical cache URL
//!                        │absent
//!                        ▼
//!            join / start flight ─► re-probe ─► materialize ─► busted URL
//! ```
//!
//! A probe that fails (as opposed to reporting absence) surfaces as
//! [`GatewayError::StoreUnavailable`] and never starts a conversion.

use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, instrument, warn};

use crate::coalesce::{CoalesceResult, CoalescerStats, FlightResult, RequestCoalescer};
use crate::config::{ConfigError, EngineConfig, GatewayConfig};
use crate::dataset::DatasetRef;
use crate::engine::{ConversionEngine, Ogr2OgrEngine, RemoteEngine};
use crate::error::{GatewayError, GatewayResult};
use crate::format::{normalize, FormatSpec};
use crate::keys::{cache_bust_token, keys};
use crate::materialize::{MaterializeJob, Materializer};
use crate::options::ConversionOptions;
use crate::store::{HttpObjectStore, LocalObjectStore, ObjectStore};

/// A client's request for one dataset in one format.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeatureRequest {
    pub dataset: DatasetRef,
    pub format: FormatSpec,
    pub options: ConversionOptions,
}

impl FeatureRequest {
    /// Build a request from raw path and query values.
    pub fn new(
        processing_level: u32,
        region_code: &str,
        admin_level: u32,
        format_token: &str,
    ) -> GatewayResult<Self> {
        Ok(Self {
            dataset: DatasetRef::new(processing_level, region_code, admin_level)?,
            format: normalize(format_token),
            options: ConversionOptions::new(),
        })
    }

    pub fn with_options(mut self, options: ConversionOptions) -> Self {
        self.options = options;
        self
    }
}

/// How a request was satisfied.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionKind {
    /// The native source was requested; nothing was probed or converted.
    Native,
    /// The artifact already existed in the cache.
    CacheHit,
    /// The artifact was converted and published for this request.
    Materialized,
}

/// URL answering a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub url: String,
    pub kind: ResolutionKind,
}

struct GatewayInner {
    assets: Arc<dyn ObjectStore>,
    cache: Arc<dyn ObjectStore>,
    materializer: Materializer,
    coalescer: Arc<RequestCoalescer>,
    probe_timeout: Duration,
    request_timeout: Duration,
    tiles_url: String,
    engine_name: &'static str,
}

/// The materialization-on-demand gateway.
///
/// Cheap to clone; clones share the coalescer and the store clients.
#[derive(Clone)]
pub struct Gateway {
    inner: Arc<GatewayInner>,
}

impl Gateway {
    /// Assemble a gateway from explicit collaborators.
    pub fn new(
        config: &GatewayConfig,
        assets: Arc<dyn ObjectStore>,
        cache: Arc<dyn ObjectStore>,
        engine: Arc<dyn ConversionEngine>,
    ) -> Self {
        let engine_name = engine.name();
        let materializer = Materializer::new(
            engine,
            Arc::clone(&assets),
            Arc::clone(&cache),
            config.work_dir.clone(),
        );
        Self {
            inner: Arc::new(GatewayInner {
                assets,
                cache,
                materializer,
                coalescer: Arc::new(RequestCoalescer::new()),
                probe_timeout: config.probe_timeout,
                request_timeout: config.request_timeout,
                tiles_url: config.tiles_url.trim_end_matches('/').to_string(),
                engine_name,
            }),
        }
    }

    /// Build stores and engine described by `config`.
    ///
    /// `file://` URLs select a directory-backed store; anything else is
    /// reached over HTTP.
    pub fn from_config(config: &GatewayConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let assets = store_for(&config.assets_url, "", config.request_timeout)?;
        let cache = store_for(
            &config.cache_url,
            &config.cache_bucket,
            config.request_timeout,
        )?;

        let engine: Arc<dyn ConversionEngine> = match &config.engine {
            EngineConfig::Local {
                program,
                fetch_source,
            } => {
                let engine = Ogr2OgrEngine::new(program.clone());
                // ogr2ogr cannot open file:// URLs, so local assets are copied in
                if *fetch_source || config.assets_url.starts_with("file://") {
                    Arc::new(engine.with_local_sources())
                } else {
                    Arc::new(engine)
                }
            }
            EngineConfig::Remote { url } => Arc::new(
                RemoteEngine::with_timeout(url.clone(), config.request_timeout).map_err(|e| {
                    ConfigError::Backend {
                        component: "remote engine",
                        reason: e.to_string(),
                    }
                })?,
            ),
        };

        info!(
            assets = %config.assets_url,
            cache = %config.cache_url,
            writable = !config.cache_bucket.is_empty() || config.cache_url.starts_with("file://"),
            engine = engine.name(),
            "Gateway configured"
        );
        Ok(Self::new(config, assets, cache, engine))
    }

    /// Resolve a request to a URL, converting on a cache miss.
    ///
    /// Bounded by the configured request timeout; on expiry the caller gets
    /// [`GatewayError::Timeout`] and gives up its interest in any flight.
    #[instrument(
        skip(self, request),
        fields(dataset = %request.dataset, format = %request.format.canonical_suffix())
    )]
    pub async fn resolve(&self, request: &FeatureRequest) -> GatewayResult<Resolution> {
        let deadline = self.inner.request_timeout;
        match tokio::time::timeout(deadline, self.resolve_unbounded(request)).await {
            Ok(result) => {
                if let Err(ref e) = result {
                    debug!(error = %e, "Request failed");
                }
                result
            }
            Err(_) => {
                warn!(timeout_secs = deadline.as_secs(), "Request timed out");
                Err(GatewayError::Timeout(deadline.as_secs()))
            }
        }
    }

    async fn resolve_unbounded(&self, request: &FeatureRequest) -> GatewayResult<Resolution> {
        if !request.format.is_key_safe() {
            return Err(GatewayError::InvalidRequest(format!(
                "unsupported format '{}'",
                request.format.requested_token()
            )));
        }

        let keys = keys(&request.dataset, &request.format, &request.options);

        if keys.is_native() {
            debug!("Native format requested");
            return Ok(Resolution {
                url: self.inner.assets.public_url(&keys.source_key),
                kind: ResolutionKind::Native,
            });
        }

        if self.inner.exists(&keys.target_key).await? {
            debug!(key = %keys.target_key, "Cache hit");
            return Ok(Resolution {
                url: self.inner.cache.public_url(&keys.target_key),
                kind: ResolutionKind::CacheHit,
            });
        }

        debug!(key = %keys.target_key, "Cache miss");
        let job = MaterializeJob {
            dataset: request.dataset.clone(),
            format: request.format.clone(),
            options: request.options.clone(),
            keys,
        };
        self.join_flight(job).await
    }

    async fn join_flight(&self, job: MaterializeJob) -> GatewayResult<Resolution> {
        match self.inner.coalescer.register(&job.keys.target_key) {
            CoalesceResult::Leader { waiter, ticket } => {
                let inner = Arc::clone(&self.inner);
                tokio::spawn(async move {
                    let result = inner.run_flight(&job, ticket.cancel_token()).await;
                    ticket.complete(result);
                });
                waiter.wait().await
            }
            CoalesceResult::Follower { waiter } => waiter.wait().await,
        }
    }

    /// Probe the cache for `key`.
    pub async fn exists(&self, key: &str) -> GatewayResult<bool> {
        self.inner.exists(key).await
    }

    /// Location of the pre-rendered vector tiles for `dataset`, if a tiles
    /// base URL is configured.
    pub fn tiles_url(&self, dataset: &DatasetRef) -> Option<String> {
        if self.inner.tiles_url.is_empty() {
            return None;
        }
        Some(format!(
            "{}/{}/{}.json",
            self.inner.tiles_url,
            dataset.level_prefix(),
            dataset.layer_name()
        ))
    }

    pub fn coalescer_stats(&self) -> CoalescerStats {
        self.inner.coalescer.stats()
    }

    pub fn engine_name(&self) -> &'static str {
        self.inner.engine_name
    }

    pub fn cache_backend(&self) -> &'static str {
        self.inner.cache.backend_tag()
    }
}

impl GatewayInner {
    async fn exists(&self, key: &str) -> GatewayResult<bool> {
        let unavailable = |reason: String| GatewayError::StoreUnavailable {
            key: key.to_string(),
            reason,
        };
        let token = cache_bust_token();
        match tokio::time::timeout(self.probe_timeout, self.cache.head_exists(key, &token)).await {
            Ok(Ok(present)) => Ok(present),
            Ok(Err(e)) => {
                warn!(key = %key, error = %e, "Cache probe failed");
                Err(unavailable(e.to_string()))
            }
            Err(_) => {
                warn!(key = %key, timeout_secs = self.probe_timeout.as_secs(), "Cache probe timed out");
                Err(unavailable(format!(
                    "probe timed out after {}s",
                    self.probe_timeout.as_secs()
                )))
            }
        }
    }

    #[instrument(skip(self, job, cancel), fields(key = %job.keys.target_key))]
    async fn run_flight(&self, job: &MaterializeJob, cancel: CancellationToken) -> FlightResult {
        // Another instance or an earlier flight may have published meanwhile
        if self.exists(&job.keys.target_key).await? {
            debug!("Artifact appeared before conversion started");
            return Ok(Resolution {
                url: self.cache.public_url(&job.keys.target_key),
                kind: ResolutionKind::CacheHit,
            });
        }

        let url = self.materializer.materialize(job, cancel).await?;
        Ok(Resolution {
            url,
            kind: ResolutionKind::Materialized,
        })
    }
}

fn store_for(
    url: &str,
    write_base: &str,
    timeout: Duration,
) -> Result<Arc<dyn ObjectStore>, ConfigError> {
    if let Some(path) = url.strip_prefix("file://") {
        return Ok(Arc::new(LocalObjectStore::new(path)));
    }
    let store = HttpObjectStore::with_timeout(url, timeout)
        .map_err(|e| ConfigError::Backend {
            component: "object store",
            reason: e.to_string(),
        })?
        .with_write_base(write_base);
    Ok(Arc::new(store))
}
