//! codgate - administrative boundary features in any vector format
//!
//! Datasets are stored once as GeoParquet. This library serves them in
//! whatever vector format a client asks for, converting on first request
//! and caching the result in an object store:
//!
//! - [`format`] and [`keys`] map a request onto store keys
//! - [`gateway`] probes the cache and coalesces concurrent misses
//! - [`materialize`] runs the conversion engine and publishes the output
//! - [`server`] exposes it all over HTTP
//!
//! # Example
//!
//! ```ignore
//! use codgate::{FeatureRequest, Gateway, GatewayConfig};
//!
//! let config = GatewayConfig::load(None)?;
//! let gateway = Gateway::from_config(&config)?;
//!
//! let request = FeatureRequest::new(1, "abc", 2, "shp")?;
//! let resolution = gateway.resolve(&request).await?;
//! println!("{}", resolution.url);
//! ```

pub mod coalesce;
pub mod config;
pub mod dataset;
pub mod engine;
pub mod error;
pub mod format;
pub mod gateway;
pub mod keys;
pub mod logging;
pub mod materialize;
pub mod options;
pub mod package;
pub mod prewarm;
pub mod server;
pub mod store;
pub mod workspace;

pub use config::{ConfigError, EngineConfig, GatewayConfig};
pub use dataset::DatasetRef;
pub use error::{GatewayError, GatewayResult};
pub use format::{normalize, FormatSpec};
pub use gateway::{FeatureRequest, Gateway, Resolution, ResolutionKind};
pub use options::ConversionOptions;
pub use prewarm::{PrewarmHandle, PrewarmOutcome, PrewarmPlan, PrewarmReport};

/// Crate version, reported by `/health` and the CLI.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
