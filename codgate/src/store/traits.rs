//! Object store interface.
//!
//! The gateway needs four things from a store: a public URL for a key, a
//! lightweight existence probe, a full read, and a whole-object write. The
//! store is assumed to make a put visible atomically: an object is either
//! absent or fully present, never partially written.
//!
//! The trait uses `Pin<Box<dyn Future>>` so stores can be held as
//! `Arc<dyn ObjectStore>` and swapped per deployment (HTTP, local
//! directory, in-memory).

use std::future::Future;
use std::pin::Pin;

use bytes::Bytes;
use thiserror::Error;

/// Boxed future type for dyn-compatible async methods.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Errors returned by object store operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    /// The key does not exist.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The store answered with an unexpected HTTP status.
    #[error("HTTP {status} from {url}")]
    Http { status: u16, url: String },

    /// The request never got a response (DNS, connect, reset).
    #[error("transport error: {0}")]
    Transport(String),

    /// The request exceeded its time budget.
    #[error("timed out after {0}s")]
    Timeout(u64),

    /// Local I/O failed (directory-backed stores).
    #[error("I/O error: {0}")]
    Io(String),

    /// The store was configured without a write location.
    #[error("store '{0}' is read-only")]
    ReadOnly(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

/// A keyed object store.
///
/// Implementations must be `Send + Sync`; one instance is shared by every
/// request task.
pub trait ObjectStore: Send + Sync {
    /// Short name used in logs (`http`, `local`, `memory`).
    fn backend_tag(&self) -> &'static str;

    /// Stable public URL of a key, without any cache-busting token.
    fn public_url(&self, key: &str) -> String;

    /// Check whether `key` exists without downloading it.
    ///
    /// `bust_token` must be attached to the probe so that no intermediary
    /// cache can answer in the store's place.
    ///
    /// # Returns
    ///
    /// - `Ok(true)` if the object is present
    /// - `Ok(false)` if the store positively reports it absent
    /// - `Err(_)` if the store could not be asked; callers must not read
    ///   this as absence
    fn head_exists(&self, key: &str, bust_token: &str) -> BoxFuture<'_, Result<bool, StoreError>>;

    /// Read a whole object.
    fn get(&self, key: &str) -> BoxFuture<'_, Result<Bytes, StoreError>>;

    /// Write a whole object, replacing any previous version.
    fn put(&self, key: &str, body: Bytes) -> BoxFuture<'_, Result<(), StoreError>>;
}

/// Content type advertised when publishing an artifact.
pub fn content_type_for(key: &str) -> &'static str {
    let suffix = key.rsplit('/').next().unwrap_or(key);
    if suffix.ends_with(".zip") {
        "application/zip"
    } else if suffix.ends_with(".geojson") {
        "application/geo+json"
    } else if suffix.ends_with(".json") {
        "application/json"
    } else if suffix.ends_with(".csv") {
        "text/csv"
    } else if suffix.ends_with(".kml") {
        "application/vnd.google-earth.kml+xml"
    } else if suffix.ends_with(".gpkg") {
        "application/geopackage+sqlite3"
    } else if suffix.ends_with(".parquet") {
        "application/vnd.apache.parquet"
    } else {
        "application/octet-stream"
    }
}
