//! Cache key construction and cache-busting tokens.
//!
//! Keys are hierarchical store paths:
//!
//! ```text
//! level-{processing_level}/{region}_adm{admin_level}.{suffix}
//! ```
//!
//! The source key always uses the native `parquet` suffix. Target keys use
//! the format's canonical suffix; artifacts built with custom conversion
//! options get a `~{digest}` variant tag so they never shadow the default.

use rand::Rng;

use crate::dataset::DatasetRef;
use crate::format::{FormatSpec, NATIVE_SUFFIX};
use crate::options::ConversionOptions;

/// Query parameter carrying the cache-busting token.
pub const CACHE_BUST_PARAM: &str = "v";

/// Source and target store keys for one request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CacheKeys {
    /// Key of the canonical GeoParquet source object.
    pub source_key: String,
    /// Key of the materialized artifact for this dataset and format.
    pub target_key: String,
}

impl CacheKeys {
    /// Whether the request addresses the source object itself.
    pub fn is_native(&self) -> bool {
        self.source_key == self.target_key
    }
}

/// Key of the canonical source object for a dataset.
pub fn source_key(dataset: &DatasetRef) -> String {
    format!(
        "{}/{}.{}",
        dataset.level_prefix(),
        dataset.layer_name(),
        NATIVE_SUFFIX
    )
}

/// Build the source and target keys for a request.
///
/// # Example
///
/// ```
/// use codgate::{keys, ConversionOptions, DatasetRef};
/// use codgate::format::normalize;
///
/// let dataset = DatasetRef::new(1, "abc", 2).unwrap();
/// let keys = keys::keys(&dataset, &normalize("shp"), &ConversionOptions::new());
/// assert_eq!(keys.source_key, "level-1/abc_adm2.parquet");
/// assert_eq!(keys.target_key, "level-1/abc_adm2.shp.zip");
/// ```
pub fn keys(dataset: &DatasetRef, spec: &FormatSpec, options: &ConversionOptions) -> CacheKeys {
    let source_key = source_key(dataset);

    if spec.is_native() {
        return CacheKeys {
            target_key: source_key.clone(),
            source_key,
        };
    }

    let stem = match options.variant_tag() {
        Some(tag) => format!("{}~{}", dataset.layer_name(), tag),
        None => dataset.layer_name(),
    };
    let target_key = format!(
        "{}/{}.{}",
        dataset.level_prefix(),
        stem,
        spec.canonical_suffix()
    );

    CacheKeys {
        source_key,
        target_key,
    }
}

/// Generate a fresh random cache-busting token (32 hex characters).
pub fn cache_bust_token() -> String {
    let value: u128 = rand::rng().random();
    format!("{:032x}", value)
}

/// Append a cache-busting token to a URL.
pub fn with_cache_bust(url: &str, token: &str) -> String {
    let separator = if url.contains('?') { '&' } else { '?' };
    format!("{}{}{}={}", url, separator, CACHE_BUST_PARAM, token)
}
