//! Directory-backed object store.
//!
//! Keys map onto paths below a root directory. Writes land in a temporary
//! sibling file first and are renamed into place, so a reader sees either
//! the previous state or the complete new object.

use std::path::{Component, Path, PathBuf};

use bytes::Bytes;
use tracing::debug;

use super::traits::{BoxFuture, ObjectStore, StoreError};
use crate::keys::cache_bust_token;

/// Object store rooted at a local directory.
#[derive(Debug, Clone)]
pub struct LocalObjectStore {
    root: PathBuf,
    base_url: String,
}

impl LocalObjectStore {
    /// Create a store rooted at `root`; public URLs use the `file://` scheme.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        let root = root.into();
        let base_url = format!("file://{}", root.display());
        Self { root, base_url }
    }

    /// Serve public URLs from `base_url` instead of `file://` paths.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    /// Resolve a key to a path, refusing anything that escapes the root.
    fn path_for(&self, key: &str) -> Result<PathBuf, StoreError> {
        let relative = Path::new(key);
        let escapes = relative
            .components()
            .any(|c| !matches!(c, Component::Normal(_)));
        if key.is_empty() || escapes {
            return Err(StoreError::Io(format!("invalid object key '{}'", key)));
        }
        Ok(self.root.join(relative))
    }
}

impl ObjectStore for LocalObjectStore {
    fn backend_tag(&self) -> &'static str {
        "local"
    }

    fn public_url(&self, key: &str) -> String {
        format!("{}/{}", self.base_url, key)
    }

    fn head_exists(&self, key: &str, _bust_token: &str) -> BoxFuture<'_, Result<bool, StoreError>> {
        let path = self.path_for(key);
        Box::pin(async move {
            let path = path?;
            match tokio::fs::metadata(&path).await {
                Ok(meta) => Ok(meta.is_file()),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn get(&self, key: &str) -> BoxFuture<'_, Result<Bytes, StoreError>> {
        let path = self.path_for(key);
        let key = key.to_string();
        Box::pin(async move {
            let path = path?;
            match tokio::fs::read(&path).await {
                Ok(data) => Ok(Bytes::from(data)),
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Err(StoreError::NotFound(key)),
                Err(e) => Err(e.into()),
            }
        })
    }

    fn put(&self, key: &str, body: Bytes) -> BoxFuture<'_, Result<(), StoreError>> {
        let path = self.path_for(key);
        Box::pin(async move {
            let path = path?;
            if let Some(parent) = path.parent() {
                tokio::fs::create_dir_all(parent).await?;
            }

            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_default();
            let staging = path.with_file_name(format!(".{}.{}.tmp", file_name, cache_bust_token()));

            if let Err(e) = tokio::fs::write(&staging, &body).await {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(e.into());
            }
            if let Err(e) = tokio::fs::rename(&staging, &path).await {
                let _ = tokio::fs::remove_file(&staging).await;
                return Err(e.into());
            }

            debug!(path = %path.display(), size_bytes = body.len(), "Object written");
            Ok(())
        })
    }
}
