//! INI configuration file.
//!
//! ```ini
//! [server]
//! bind = 127.0.0.1:8000
//! request_timeout_secs = 900
//!
//! [store]
//! assets_url = https://assets.example.org
//! cache_url = https://cache.example.org
//! cache_bucket = https://bucket.example.org
//! tiles_url = https://cod-tiles.fieldmaps.io/assets
//! probe_timeout_secs = 10
//!
//! [engine]
//! kind = local
//! program = ogr2ogr
//! fetch_source = false
//! remote_url =
//!
//! [workspace]
//! directory = /var/tmp/codgate
//!
//! [prewarm]
//! concurrency = 4
//! ```
//!
//! Every key is optional; absent keys keep the value of the previous layer.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;

use super::{parse_bind, ConfigError, EngineConfig, GatewayConfig};
use crate::engine::DEFAULT_PROGRAM;

/// Default config file location, `{config_dir}/codgate/config.ini`.
pub fn config_file_path() -> Option<PathBuf> {
    dirs::config_dir().map(|dir| dir.join("codgate").join("config.ini"))
}

/// A parsed configuration file.
#[derive(Debug, Clone)]
pub struct ConfigFile {
    ini: Ini,
}

impl ConfigFile {
    /// Parse the file at `path`.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|e| ConfigError::Read {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(Self { ini })
    }

    /// Parse configuration text; used for inline configs and tests.
    pub fn parse(text: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(text).map_err(|e| ConfigError::Read {
            path: PathBuf::from("<inline>"),
            reason: e.to_string(),
        })?;
        Ok(Self { ini })
    }

    fn get(&self, section: &str, key: &str) -> Option<&str> {
        self.ini
            .section(Some(section))
            .and_then(|props| props.get(key))
            .map(str::trim)
    }

    fn parse_value<T>(&self, section: &str, key: &str) -> Result<Option<T>, ConfigError>
    where
        T: FromStr,
        T::Err: std::fmt::Display,
    {
        match self.get(section, key) {
            None | Some("") => Ok(None),
            Some(raw) => raw.parse().map(Some).map_err(|e: T::Err| {
                ConfigError::InvalidValue {
                    key: format!("{}.{}", section, key),
                    reason: format!("'{}': {}", raw, e),
                }
            }),
        }
    }

    /// Overlay the file's settings on `config`.
    pub fn apply(&self, config: &mut GatewayConfig) -> Result<(), ConfigError> {
        // [server]
        if let Some(bind) = self.get("server", "bind").filter(|v| !v.is_empty()) {
            config.bind = parse_bind("server.bind", bind)?;
        }
        if let Some(secs) = self.parse_value::<u64>("server", "request_timeout_secs")? {
            config.request_timeout = Duration::from_secs(secs);
        }

        // [store]
        if let Some(url) = self.get("store", "assets_url") {
            config.assets_url = url.to_string();
        }
        if let Some(url) = self.get("store", "cache_url") {
            config.cache_url = url.to_string();
        }
        if let Some(bucket) = self.get("store", "cache_bucket") {
            config.cache_bucket = bucket.to_string();
        }
        if let Some(url) = self.get("store", "tiles_url") {
            config.tiles_url = url.to_string();
        }
        if let Some(secs) = self.parse_value::<u64>("store", "probe_timeout_secs")? {
            config.probe_timeout = Duration::from_secs(secs);
        }

        // [engine]
        config.engine = self.engine(&config.engine)?;

        // [workspace]
        if let Some(dir) = self.get("workspace", "directory").filter(|v| !v.is_empty()) {
            config.work_dir = PathBuf::from(dir);
        }

        // [prewarm]
        if let Some(n) = self.parse_value::<usize>("prewarm", "concurrency")? {
            config.prewarm_concurrency = n;
        }

        Ok(())
    }

    fn engine(&self, current: &EngineConfig) -> Result<EngineConfig, ConfigError> {
        let kind = match self.get("engine", "kind") {
            None | Some("") => current.kind(),
            Some(kind) => match kind.to_ascii_lowercase().as_str() {
                "local" => "local",
                "remote" => "remote",
                other => {
                    return Err(ConfigError::InvalidValue {
                        key: "engine.kind".to_string(),
                        reason: format!("'{}' is not one of local, remote", other),
                    })
                }
            },
        };

        if kind == "remote" {
            let url = match (self.get("engine", "remote_url"), current) {
                (Some(url), _) if !url.is_empty() => url.to_string(),
                (_, EngineConfig::Remote { url }) => url.clone(),
                _ => return Err(ConfigError::Missing("engine.remote_url")),
            };
            return Ok(EngineConfig::Remote { url });
        }

        let (mut program, mut fetch_source) = match current {
            EngineConfig::Local {
                program,
                fetch_source,
            } => (program.clone(), *fetch_source),
            EngineConfig::Remote { .. } => (DEFAULT_PROGRAM.to_string(), false),
        };
        if let Some(p) = self.get("engine", "program").filter(|v| !v.is_empty()) {
            program = p.to_string();
        }
        if let Some(flag) = self.parse_value::<bool>("engine", "fetch_source")? {
            fetch_source = flag;
        }
        Ok(EngineConfig::Local {
            program,
            fetch_source,
        })
    }

    /// Render `config` as INI text.
    pub fn render(config: &GatewayConfig) -> String {
        let mut ini = Ini::new();
        ini.with_section(Some("server"))
            .set("bind", config.bind.to_string())
            .set(
                "request_timeout_secs",
                config.request_timeout.as_secs().to_string(),
            );
        ini.with_section(Some("store"))
            .set("assets_url", config.assets_url.as_str())
            .set("cache_url", config.cache_url.as_str())
            .set("cache_bucket", config.cache_bucket.as_str())
            .set("tiles_url", config.tiles_url.as_str())
            .set(
                "probe_timeout_secs",
                config.probe_timeout.as_secs().to_string(),
            );
        match &config.engine {
            EngineConfig::Local {
                program,
                fetch_source,
            } => {
                ini.with_section(Some("engine"))
                    .set("kind", "local")
                    .set("program", program.as_str())
                    .set("fetch_source", fetch_source.to_string());
            }
            EngineConfig::Remote { url } => {
                ini.with_section(Some("engine"))
                    .set("kind", "remote")
                    .set("remote_url", url.as_str());
            }
        }
        ini.with_section(Some("workspace"))
            .set("directory", config.work_dir.display().to_string());
        ini.with_section(Some("prewarm"))
            .set("concurrency", config.prewarm_concurrency.to_string());

        let mut out = Vec::new();
        // Writing into a Vec cannot fail
        let _ = ini.write_to(&mut out);
        String::from_utf8_lossy(&out).to_string()
    }

    /// Write `config` to `path`, creating parent directories.
    pub fn save(config: &GatewayConfig, path: &Path) -> Result<(), ConfigError> {
        let write_err = |e: std::io::Error| ConfigError::Write {
            path: path.to_path_buf(),
            reason: e.to_string(),
        };
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(write_err)?;
        }
        std::fs::write(path, Self::render(config)).map_err(write_err)
    }
}
