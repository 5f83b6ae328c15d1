//! Gateway configuration.
//!
//! [`GatewayConfig`] is an explicit value handed to
//! [`Gateway::from_config`](crate::gateway::Gateway::from_config). It is
//! assembled in three layers, later layers overriding earlier ones:
//!
//! 1. Built-in defaults
//! 2. The INI file (`~/.config/codgate/config.ini` or `--config`)
//! 3. Environment variables (`S3_ASSETS_URL`, `S3_CACHE_URL`,
//!    `S3_CACHE_BUCKET`, `TILES_URL`, `GDAL_URL`, `CODGATE_BIND`,
//!    `CODGATE_WORK_DIR`)

mod file;

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

pub use file::{config_file_path, ConfigFile};

use crate::engine::DEFAULT_PROGRAM;

/// Default listen address.
pub const DEFAULT_BIND: &str = "127.0.0.1:8000";

/// Default bound on an existence probe in seconds.
pub const DEFAULT_PROBE_TIMEOUT_SECS: u64 = 10;

/// Default bound on a whole request in seconds.
pub const DEFAULT_REQUEST_TIMEOUT_SECS: u64 = 900;

/// Default base URL of the pre-rendered vector tile assets.
pub const DEFAULT_TILES_URL: &str = "https://cod-tiles.fieldmaps.io/assets";

/// Default number of concurrent prewarm resolutions.
pub const DEFAULT_PREWARM_CONCURRENCY: usize = 4;

/// Errors raised while loading or validating configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file {path}: {reason}")]
    Read { path: PathBuf, reason: String },

    #[error("cannot write config file {path}: {reason}")]
    Write { path: PathBuf, reason: String },

    #[error("invalid value for {key}: {reason}")]
    InvalidValue { key: String, reason: String },

    #[error("missing required setting {0}")]
    Missing(&'static str),

    #[error("cannot build {component}: {reason}")]
    Backend {
        component: &'static str,
        reason: String,
    },
}

/// Which conversion engine the gateway drives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EngineConfig {
    /// Run `program` locally.
    Local {
        program: String,
        /// Download the source into the workspace instead of letting the
        /// engine read it over the network.
        fetch_source: bool,
    },
    /// Delegate to a remote conversion service.
    Remote { url: String },
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig::Local {
            program: DEFAULT_PROGRAM.to_string(),
            fetch_source: false,
        }
    }
}

impl EngineConfig {
    /// Value of the `[engine] kind` setting.
    pub fn kind(&self) -> &'static str {
        match self {
            EngineConfig::Local { .. } => "local",
            EngineConfig::Remote { .. } => "remote",
        }
    }
}

/// Complete gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GatewayConfig {
    /// HTTP listen address.
    pub bind: SocketAddr,

    /// Public base URL of the canonical GeoParquet assets.
    pub assets_url: String,

    /// Public base URL that cached artifacts are served from.
    pub cache_url: String,

    /// Base URL artifacts are written to with HTTP `PUT`.
    ///
    /// Empty means the gateway cannot publish; every miss fails with
    /// `PublishFailed`.
    pub cache_bucket: String,

    /// Base URL `/tiles` requests are redirected to. Empty disables the route.
    pub tiles_url: String,

    /// Bound on one existence probe.
    pub probe_timeout: Duration,

    /// Bound on a whole request, including waiting on a conversion.
    pub request_timeout: Duration,

    pub engine: EngineConfig,

    /// Parent directory of per-job workspaces.
    pub work_dir: PathBuf,

    /// Concurrent resolutions during prewarm.
    pub prewarm_concurrency: usize,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([127, 0, 0, 1], 8000)),
            assets_url: String::new(),
            cache_url: String::new(),
            cache_bucket: String::new(),
            tiles_url: DEFAULT_TILES_URL.to_string(),
            probe_timeout: Duration::from_secs(DEFAULT_PROBE_TIMEOUT_SECS),
            request_timeout: Duration::from_secs(DEFAULT_REQUEST_TIMEOUT_SECS),
            engine: EngineConfig::default(),
            work_dir: std::env::temp_dir().join("codgate"),
            prewarm_concurrency: DEFAULT_PREWARM_CONCURRENCY,
        }
    }
}

impl GatewayConfig {
    /// Create a configuration for the given asset and cache locations.
    pub fn new(assets_url: impl Into<String>, cache_url: impl Into<String>) -> Self {
        Self {
            assets_url: assets_url.into(),
            cache_url: cache_url.into(),
            ..Default::default()
        }
    }

    pub fn with_cache_bucket(mut self, bucket: impl Into<String>) -> Self {
        self.cache_bucket = bucket.into();
        self
    }

    pub fn with_tiles_url(mut self, url: impl Into<String>) -> Self {
        self.tiles_url = url.into();
        self
    }

    pub fn with_bind(mut self, bind: SocketAddr) -> Self {
        self.bind = bind;
        self
    }

    pub fn with_engine(mut self, engine: EngineConfig) -> Self {
        self.engine = engine;
        self
    }

    pub fn with_probe_timeout(mut self, timeout: Duration) -> Self {
        self.probe_timeout = timeout;
        self
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }

    pub fn with_work_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.work_dir = dir.into();
        self
    }

    pub fn with_prewarm_concurrency(mut self, concurrency: usize) -> Self {
        self.prewarm_concurrency = concurrency;
        self
    }

    /// Load defaults, then the config file at `path` (or the default path),
    /// then the process environment.
    ///
    /// A missing file at the default path is not an error; a missing file
    /// at an explicit path is.
    pub fn load(path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let config = Self::load_layers(path)?;
        config.validate()?;
        Ok(config)
    }

    /// Like [`load`](Self::load) but without validation, for inspecting a
    /// partial configuration.
    pub fn load_layers(path: Option<&std::path::Path>) -> Result<Self, ConfigError> {
        let mut config = Self::default();

        match path {
            Some(path) => ConfigFile::load(path)?.apply(&mut config)?,
            None => {
                if let Some(path) = config_file_path() {
                    if path.exists() {
                        ConfigFile::load(&path)?.apply(&mut config)?;
                    }
                }
            }
        }

        config.apply_env(|name| std::env::var(name).ok())?;
        Ok(config)
    }

    /// Apply environment overrides read through `lookup`.
    pub fn apply_env<F>(&mut self, lookup: F) -> Result<(), ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let value = |name: &str| lookup(name).filter(|v| !v.trim().is_empty());

        if let Some(url) = value("S3_ASSETS_URL") {
            self.assets_url = url;
        }
        if let Some(url) = value("S3_CACHE_URL") {
            self.cache_url = url;
        }
        if let Some(bucket) = value("S3_CACHE_BUCKET") {
            self.cache_bucket = bucket;
        }
        if let Some(url) = value("TILES_URL") {
            self.tiles_url = url;
        }
        if let Some(url) = value("GDAL_URL") {
            self.engine = EngineConfig::Remote { url };
        }
        if let Some(bind) = value("CODGATE_BIND") {
            self.bind = parse_bind("CODGATE_BIND", &bind)?;
        }
        if let Some(dir) = value("CODGATE_WORK_DIR") {
            self.work_dir = PathBuf::from(dir);
        }
        Ok(())
    }

    /// Check that the configuration can drive a gateway.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.assets_url.trim().is_empty() {
            return Err(ConfigError::Missing("store.assets_url"));
        }
        if self.cache_url.trim().is_empty() {
            return Err(ConfigError::Missing("store.cache_url"));
        }
        check_url("store.assets_url", &self.assets_url)?;
        check_url("store.cache_url", &self.cache_url)?;
        if !self.cache_bucket.is_empty() {
            check_url("store.cache_bucket", &self.cache_bucket)?;
        }
        if !self.tiles_url.is_empty() {
            check_url("store.tiles_url", &self.tiles_url)?;
        }

        match &self.engine {
            EngineConfig::Local { program, .. } if program.trim().is_empty() => {
                return Err(ConfigError::Missing("engine.program"));
            }
            EngineConfig::Remote { url } => check_url("engine.remote_url", url)?,
            EngineConfig::Local { .. } => {}
        }

        if self.probe_timeout.is_zero() {
            return Err(invalid("store.probe_timeout_secs", "must be greater than zero"));
        }
        if self.request_timeout.is_zero() {
            return Err(invalid("server.request_timeout_secs", "must be greater than zero"));
        }
        if self.prewarm_concurrency == 0 {
            return Err(invalid("prewarm.concurrency", "must be greater than zero"));
        }
        Ok(())
    }
}

fn invalid(key: &str, reason: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        reason: reason.to_string(),
    }
}

fn check_url(key: &str, url: &str) -> Result<(), ConfigError> {
    const SCHEMES: &[&str] = &["http://", "https://", "file://"];
    if SCHEMES.iter().any(|scheme| url.starts_with(scheme)) {
        Ok(())
    } else {
        Err(invalid(key, &format!("'{}' is not an http(s) or file URL", url)))
    }
}

pub(crate) fn parse_bind(key: &str, value: &str) -> Result<SocketAddr, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|e| invalid(key, &format!("'{}': {}", value, e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn env(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |name| map.get(name).cloned()
    }

    #[test]
    fn test_default_engine_is_local_ogr2ogr() {
        let config = GatewayConfig::default();
        assert_eq!(
            config.engine,
            EngineConfig::Local {
                program: "ogr2ogr".into(),
                fetch_source: false
            }
        );
        assert_eq!(config.bind.to_string(), DEFAULT_BIND);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = GatewayConfig::default();
        config
            .apply_env(env(&[
                ("S3_ASSETS_URL", "https://assets.example.org"),
                ("S3_CACHE_URL", "https://cache.example.org"),
                ("S3_CACHE_BUCKET", "https://bucket.example.org"),
                ("GDAL_URL", "https://gdal.example.org"),
                ("TILES_URL", "https://tiles.example.org/assets"),
                ("CODGATE_BIND", "0.0.0.0:9000"),
                ("CODGATE_WORK_DIR", "/scratch"),
            ]))
            .unwrap();

        assert_eq!(config.assets_url, "https://assets.example.org");
        assert_eq!(config.cache_url, "https://cache.example.org");
        assert_eq!(config.cache_bucket, "https://bucket.example.org");
        assert_eq!(
            config.engine,
            EngineConfig::Remote {
                url: "https://gdal.example.org".into()
            }
        );
        assert_eq!(config.tiles_url, "https://tiles.example.org/assets");
        assert_eq!(config.bind.port(), 9000);
        assert_eq!(config.work_dir, PathBuf::from("/scratch"));
        config.validate().unwrap();
    }

    #[test]
    fn test_blank_env_values_ignored() {
        let mut config = GatewayConfig::new("https://a", "https://c");
        config.apply_env(env(&[("GDAL_URL", "  ")])).unwrap();
        assert_eq!(config.engine.kind(), "local");
    }

    #[test]
    fn test_invalid_bind_rejected() {
        let mut config = GatewayConfig::default();
        let result = config.apply_env(env(&[("CODGATE_BIND", "not-an-address")]));
        assert!(matches!(result, Err(ConfigError::InvalidValue { .. })));
    }

    #[test]
    fn test_validate_requires_urls() {
        assert!(matches!(
            GatewayConfig::default().validate(),
            Err(ConfigError::Missing("store.assets_url"))
        ));
        assert!(matches!(
            GatewayConfig::new("https://a", "").validate(),
            Err(ConfigError::Missing("store.cache_url"))
        ));
        assert!(matches!(
            GatewayConfig::new("s3://a", "https://c").validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
        GatewayConfig::new("https://a", "file:///srv/cache")
            .validate()
            .unwrap();
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        let config = GatewayConfig::new("https://a", "https://c").with_prewarm_concurrency(0);
        assert!(config.validate().is_err());
        let config =
            GatewayConfig::new("https://a", "https://c").with_probe_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tiles_url_default_and_validation() {
        assert_eq!(GatewayConfig::default().tiles_url, DEFAULT_TILES_URL);
        GatewayConfig::new("https://a", "https://c")
            .with_tiles_url("")
            .validate()
            .unwrap();
        assert!(matches!(
            GatewayConfig::new("https://a", "https://c")
                .with_tiles_url("tiles.example.org")
                .validate(),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
