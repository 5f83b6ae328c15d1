//! Integration tests for the gateway protocol.
//!
//! These tests drive the public API end to end:
//! - request → keys → probe → flight → engine → package → publish
//! - single-flight under concurrent misses
//! - failure paths that must leave the cache untouched
//!
//! Run with: `cargo test --test gateway_integration`

use std::io::Read;
use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use parking_lot::Mutex;
use tempfile::TempDir;
use tokio_util::sync::CancellationToken;

use codgate::engine::{ConversionEngine, ConversionRequest, EngineError};
use codgate::store::{BoxFuture, LocalObjectStore, MemoryObjectStore, ObjectStore};
use codgate::{
    ConversionOptions, FeatureRequest, Gateway, GatewayConfig, GatewayError, ResolutionKind,
};

// ============================================================================
// Test Engine
// ============================================================================

/// What the fake engine writes at the destination.
#[derive(Clone)]
enum Output {
    File(Vec<u8>),
    Directory(Vec<(&'static str, Vec<u8>)>),
}

/// Conversion engine that writes canned output after an optional delay.
struct FakeEngine {
    output: Output,
    delay: Duration,
    invocations: AtomicUsize,
    cancelled: AtomicUsize,
    layers: Mutex<Vec<String>>,
}

impl FakeEngine {
    fn new(output: Output) -> Self {
        Self {
            output,
            delay: Duration::ZERO,
            invocations: AtomicUsize::new(0),
            cancelled: AtomicUsize::new(0),
            layers: Mutex::new(Vec::new()),
        }
    }

    fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    fn invocations(&self) -> usize {
        self.invocations.load(Ordering::SeqCst)
    }

    fn cancelled(&self) -> usize {
        self.cancelled.load(Ordering::SeqCst)
    }

    async fn write(&self, destination: &Path) -> Result<(), EngineError> {
        match &self.output {
            Output::File(data) => tokio::fs::write(destination, data).await?,
            Output::Directory(members) => {
                tokio::fs::create_dir_all(destination).await?;
                for (name, data) in members {
                    tokio::fs::write(destination.join(name), data).await?;
                }
            }
        }
        Ok(())
    }
}

impl ConversionEngine for FakeEngine {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn reads_remote_sources(&self) -> bool {
        true
    }

    fn convert<'a>(
        &'a self,
        request: &'a ConversionRequest,
        cancel: CancellationToken,
    ) -> BoxFuture<'a, Result<(), EngineError>> {
        self.invocations.fetch_add(1, Ordering::SeqCst);
        self.layers.lock().push(request.layer_name());
        Box::pin(async move {
            tokio::select! {
                _ = tokio::time::sleep(self.delay) => {}
                _ = cancel.cancelled() => {
                    self.cancelled.fetch_add(1, Ordering::SeqCst);
                    return Err(EngineError::Cancelled);
                }
            }
            self.write(&request.destination).await
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

const ASSETS: &str = "https://assets.example.org";
const CACHE: &str = "https://cache.example.org";

struct Harness {
    engine: Arc<FakeEngine>,
    cache: Arc<MemoryObjectStore>,
    work: TempDir,
    gateway: Gateway,
}

fn harness(engine: FakeEngine) -> Harness {
    harness_with(engine, |config| config)
}

fn harness_with(engine: FakeEngine, tweak: impl FnOnce(GatewayConfig) -> GatewayConfig) -> Harness {
    let work = TempDir::new().unwrap();
    let engine = Arc::new(engine);
    let assets = Arc::new(MemoryObjectStore::new(ASSETS));
    let cache = Arc::new(MemoryObjectStore::new(CACHE));
    let config = tweak(GatewayConfig::new(ASSETS, CACHE).with_work_dir(work.path()));
    let gateway = Gateway::new(&config, assets, cache.clone(), engine.clone());
    Harness {
        engine,
        cache,
        work,
        gateway,
    }
}

fn geojson_engine() -> FakeEngine {
    FakeEngine::new(Output::File(
        br#"{"type":"FeatureCollection","features":[]}"#.to_vec(),
    ))
}

fn request(format: &str) -> FeatureRequest {
    FeatureRequest::new(1, "ABC", 2, format).unwrap()
}

fn leftover_workspaces(work: &TempDir) -> usize {
    std::fs::read_dir(work.path()).unwrap().count()
}

// ============================================================================
// Scenarios
// ============================================================================

/// Miss: the engine runs once for layer `abc_adm2` and the busted URL comes back.
/// Repeat: the same request is now a hit with the canonical URL.
#[tokio::test]
async fn test_geojson_miss_then_hit() {
    let h = harness(geojson_engine());

    assert!(!h.gateway.exists("level-1/abc_adm2.geojson").await.unwrap());

    let first = h.gateway.resolve(&request("geojson")).await.unwrap();
    assert_eq!(first.kind, ResolutionKind::Materialized);
    let (path, token) = first.url.split_once("?v=").unwrap();
    assert!(path.ends_with("level-1/abc_adm2.geojson"));
    assert_eq!(token.len(), 32);
    assert_eq!(*h.engine.layers.lock(), vec!["abc_adm2".to_string()]);
    assert!(h.gateway.exists("level-1/abc_adm2.geojson").await.unwrap());

    let second = h.gateway.resolve(&request("geojson")).await.unwrap();
    assert_eq!(second.kind, ResolutionKind::CacheHit);
    assert_eq!(second.url, format!("{}/level-1/abc_adm2.geojson", CACHE));
    assert_eq!(h.engine.invocations(), 1);
    assert_eq!(leftover_workspaces(&h.work), 0);
}

#[tokio::test]
async fn test_busted_tokens_differ_between_conversions() {
    let h = harness(geojson_engine());
    let a = h.gateway.resolve(&request("kml")).await.unwrap();
    let b = h.gateway.resolve(&request("gpkg")).await.unwrap();
    let token = |url: &str| url.split_once("?v=").unwrap().1.to_string();
    assert_ne!(token(&a.url), token(&b.url));
}

#[tokio::test]
async fn test_native_format_skips_cache_and_engine() {
    let h = harness(geojson_engine());
    let resolution = h.gateway.resolve(&request("parquet")).await.unwrap();

    assert_eq!(resolution.kind, ResolutionKind::Native);
    assert_eq!(resolution.url, format!("{}/level-1/abc_adm2.parquet", ASSETS));
    assert_eq!(h.cache.head_count(), 0);
    assert_eq!(h.cache.put_count(), 0);
    assert_eq!(h.engine.invocations(), 0);
}

#[tokio::test]
async fn test_hit_issues_no_conversion() {
    let h = harness(geojson_engine());
    h.cache.insert("level-1/abc_adm2.shp.zip", &b"PK"[..]);

    let resolution = h.gateway.resolve(&request(".SHP")).await.unwrap();

    assert_eq!(resolution.url, format!("{}/level-1/abc_adm2.shp.zip", CACHE));
    assert!(!resolution.url.contains("?v="));
    assert_eq!(h.engine.invocations(), 0);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_misses_convert_once() {
    let h = harness(geojson_engine().with_delay(Duration::from_millis(200)));

    let gateway = h.gateway.clone();
    let tasks = (0..10).map(|_| {
        let gateway = gateway.clone();
        tokio::spawn(async move { gateway.resolve(&request("geojson")).await })
    });
    let results = join_all(tasks).await;

    for result in results {
        let resolution = result.unwrap().unwrap();
        assert!(resolution.url.contains("level-1/abc_adm2.geojson?v="));
    }
    assert_eq!(h.engine.invocations(), 1);
    assert_eq!(h.cache.put_count(), 1);
    assert_eq!(h.gateway.coalescer_stats().requests_coalesced, 9);
    assert_eq!(h.gateway.coalescer_stats().in_flight, 0);
}

#[tokio::test]
async fn test_distinct_formats_convert_independently() {
    let h = harness(geojson_engine().with_delay(Duration::from_millis(50)));
    let (kml, csv) = (request("kml"), request("csv"));
    let (a, b) = tokio::join!(h.gateway.resolve(&kml), h.gateway.resolve(&csv));
    a.unwrap();
    b.unwrap();
    assert_eq!(h.engine.invocations(), 2);
}

#[tokio::test]
async fn test_zero_byte_output_is_never_published() {
    let h = harness(FakeEngine::new(Output::File(Vec::new())));

    let result = h.gateway.resolve(&request("geojson")).await;

    let err = result.unwrap_err();
    assert!(matches!(err, GatewayError::ConversionProducedEmptyOutput(_)));
    assert_eq!(err.status_code(), 422);
    assert_eq!(h.cache.put_count(), 0);
    assert!(!h.gateway.exists("level-1/abc_adm2.geojson").await.unwrap());
    assert_eq!(leftover_workspaces(&h.work), 0);

    // Not a cacheable negative: the next request tries again
    let _ = h.gateway.resolve(&request("geojson")).await;
    assert_eq!(h.engine.invocations(), 2);
}

#[tokio::test]
async fn test_directory_output_published_as_one_archive() {
    let h = harness(FakeEngine::new(Output::Directory(vec![
        ("abc_adm2.shp", vec![1; 128]),
        ("abc_adm2.shx", vec![2; 64]),
        ("abc_adm2.dbf", vec![3; 32]),
        ("abc_adm2.prj", b"GEOGCS[\"WGS 84\"]".to_vec()),
        ("abc_adm2.cpg", b"UTF-8".to_vec()),
    ])));

    let resolution = h.gateway.resolve(&request("shp")).await.unwrap();

    assert!(resolution.url.contains("level-1/abc_adm2.shp.zip?v="));
    assert_eq!(h.cache.put_count(), 1);
    assert_eq!(h.cache.keys(), vec!["level-1/abc_adm2.shp.zip".to_string()]);

    let body = h.cache.object("level-1/abc_adm2.shp.zip").unwrap();
    let mut archive = zip::ZipArchive::new(std::io::Cursor::new(body.to_vec())).unwrap();
    assert_eq!(archive.len(), 5);
    let mut cpg = String::new();
    archive
        .by_name("abc_adm2.cpg")
        .unwrap()
        .read_to_string(&mut cpg)
        .unwrap();
    assert_eq!(cpg, "UTF-8");
}

#[tokio::test]
async fn test_probe_failure_is_not_a_miss() {
    let h = harness(geojson_engine());
    h.cache.set_fail_heads(true);

    let err = h.gateway.resolve(&request("kml")).await.unwrap_err();

    assert!(matches!(err, GatewayError::StoreUnavailable { .. }));
    assert_eq!(err.status_code(), 502);
    assert_eq!(h.engine.invocations(), 0);
}

#[tokio::test]
async fn test_publish_failure_leaves_key_absent() {
    let h = harness(geojson_engine());
    h.cache.set_fail_puts(true);

    let err = h.gateway.resolve(&request("kml")).await.unwrap_err();

    assert!(matches!(err, GatewayError::PublishFailed { .. }));
    assert!(!h.cache.contains("level-1/abc_adm2.kml"));
    assert_eq!(leftover_workspaces(&h.work), 0);
}

#[tokio::test]
async fn test_options_never_overwrite_default_artifact() {
    let h = harness(geojson_engine());
    h.cache.insert("level-1/abc_adm2.geojson", &b"default"[..]);

    let options = ConversionOptions::new().with_simplify("0.001").unwrap();
    let resolution = h
        .gateway
        .resolve(&request("geojson").with_options(options))
        .await
        .unwrap();

    assert_eq!(resolution.kind, ResolutionKind::Materialized);
    assert!(resolution.url.contains("level-1/abc_adm2~"));
    assert_eq!(
        h.cache.object("level-1/abc_adm2.geojson").unwrap().as_ref(),
        b"default"
    );
}

// ============================================================================
// Cancellation
// ============================================================================

#[tokio::test]
async fn test_last_waiter_gone_cancels_conversion() {
    let h = harness_with(geojson_engine().with_delay(Duration::from_secs(30)), |c| {
        c.with_request_timeout(Duration::from_millis(100))
    });

    let err = h.gateway.resolve(&request("kml")).await.unwrap_err();
    assert!(matches!(err, GatewayError::Timeout(_)));

    // The flight notices cancellation and unwinds
    for _ in 0..50 {
        if h.engine.cancelled() == 1 && h.gateway.coalescer_stats().in_flight == 0 {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert_eq!(h.engine.cancelled(), 1);
    assert_eq!(h.gateway.coalescer_stats().in_flight, 0);
    assert_eq!(h.cache.put_count(), 0);
    assert_eq!(leftover_workspaces(&h.work), 0);
}

#[tokio::test]
async fn test_remaining_waiter_keeps_conversion_alive() {
    let h = harness(geojson_engine().with_delay(Duration::from_millis(300)));

    let impatient = {
        let gateway = h.gateway.clone();
        tokio::spawn(async move { gateway.resolve(&request("kml")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;
    let patient = {
        let gateway = h.gateway.clone();
        tokio::spawn(async move { gateway.resolve(&request("kml")).await })
    };
    tokio::time::sleep(Duration::from_millis(50)).await;

    impatient.abort();
    let resolution = patient.await.unwrap().unwrap();

    assert!(resolution.url.contains("level-1/abc_adm2.kml?v="));
    assert_eq!(h.engine.invocations(), 1);
    assert_eq!(h.engine.cancelled(), 0);
    assert!(h.cache.contains("level-1/abc_adm2.kml"));
}

// ============================================================================
// Directory-backed store
// ============================================================================

#[tokio::test]
async fn test_local_store_round_trip() {
    let work = TempDir::new().unwrap();
    let cache_dir = TempDir::new().unwrap();
    let engine = Arc::new(geojson_engine());
    let assets = Arc::new(MemoryObjectStore::new(ASSETS));
    let cache: Arc<dyn ObjectStore> = Arc::new(
        LocalObjectStore::new(cache_dir.path()).with_base_url("https://files.example.org"),
    );
    let config = GatewayConfig::new(ASSETS, CACHE).with_work_dir(work.path());
    let gateway = Gateway::new(&config, assets, cache, engine.clone());

    let first = gateway.resolve(&request("geojson")).await.unwrap();
    assert!(first
        .url
        .starts_with("https://files.example.org/level-1/abc_adm2.geojson?v="));
    assert!(cache_dir.path().join("level-1/abc_adm2.geojson").is_file());

    let second = gateway.resolve(&request("geojson")).await.unwrap();
    assert_eq!(second.kind, ResolutionKind::CacheHit);
    assert_eq!(engine.invocations(), 1);
}
