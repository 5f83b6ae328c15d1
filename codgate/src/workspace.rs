//! Per-job scratch directories.
//!
//! A [`Workspace`] owns a freshly created temporary directory. The
//! directory and everything in it is removed when the workspace is dropped,
//! which covers every exit path of a conversion: success, any error
//! returned with `?`, and the task being cancelled mid-await.

use std::path::{Path, PathBuf};

use tempfile::TempDir;
use tracing::debug;

use crate::error::{GatewayError, GatewayResult};

const WORKSPACE_PREFIX: &str = "codgate-";

/// Temporary directory scoped to one conversion job.
#[derive(Debug)]
pub struct Workspace {
    dir: TempDir,
}

impl Workspace {
    /// Create a workspace under `parent`, creating `parent` if needed.
    pub fn create_in(parent: &Path) -> GatewayResult<Self> {
        std::fs::create_dir_all(parent).map_err(|e| {
            GatewayError::Workspace(format!("cannot create {}: {}", parent.display(), e))
        })?;

        let dir = tempfile::Builder::new()
            .prefix(WORKSPACE_PREFIX)
            .tempdir_in(parent)
            .map_err(|e| {
                GatewayError::Workspace(format!(
                    "cannot create workspace in {}: {}",
                    parent.display(),
                    e
                ))
            })?;

        debug!(path = %dir.path().display(), "Workspace created");
        Ok(Self { dir })
    }

    pub fn path(&self) -> &Path {
        self.dir.path()
    }

    /// Path of an entry inside the workspace.
    pub fn join(&self, name: impl AsRef<Path>) -> PathBuf {
        self.dir.path().join(name)
    }
}

impl Drop for Workspace {
    fn drop(&mut self) {
        debug!(path = %self.dir.path().display(), "Workspace released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_workspace_removed_on_drop() {
        let parent = TempDir::new().unwrap();
        let path = {
            let ws = Workspace::create_in(parent.path()).unwrap();
            std::fs::write(ws.join("big.geojson"), b"{}").unwrap();
            std::fs::create_dir(ws.join("abc_adm2.shp")).unwrap();
            std::fs::write(ws.join("abc_adm2.shp").join("abc_adm2.dbf"), b"x").unwrap();
            ws.path().to_path_buf()
        };
        assert!(!path.exists());
    }

    #[test]
    fn test_workspace_creates_parent() {
        let parent = TempDir::new().unwrap();
        let nested = parent.path().join("a").join("b");
        let ws = Workspace::create_in(&nested).unwrap();
        assert!(ws.path().starts_with(&nested));
        assert!(ws
            .path()
            .file_name()
            .unwrap()
            .to_string_lossy()
            .starts_with(WORKSPACE_PREFIX));
    }

    #[test]
    fn test_workspace_removed_on_error_path() {
        fn failing_job(parent: &Path, seen: &mut Option<PathBuf>) -> GatewayResult<()> {
            let ws = Workspace::create_in(parent)?;
            *seen = Some(ws.path().to_path_buf());
            Err(GatewayError::PackagingFailed("simulated".into()))
        }

        let parent = TempDir::new().unwrap();
        let mut seen = None;
        assert!(failing_job(parent.path(), &mut seen).is_err());
        assert!(!seen.unwrap().exists());
    }

    #[tokio::test]
    async fn test_workspace_removed_when_task_aborted() {
        let parent = TempDir::new().unwrap();
        let parent_path = parent.path().to_path_buf();
        let (tx, rx) = tokio::sync::oneshot::channel();

        let handle = tokio::spawn(async move {
            let ws = Workspace::create_in(&parent_path).unwrap();
            let _ = tx.send(ws.path().to_path_buf());
            std::future::pending::<()>().await;
            drop(ws);
        });

        let path = rx.await.unwrap();
        assert!(path.exists());
        handle.abort();
        let _ = handle.await;
        assert!(!path.exists());
    }
}
