//! Storage for resources resolved in external mode.

use std::path::{Component, Path, PathBuf};

use async_trait::async_trait;

use crate::{HuginnError, Result};

/// Where externally resolved resources are written.
///
/// Paths are relative (`<resource_dir>/<id><ext>`); the sink decides what
/// they are relative to.
#[async_trait]
pub trait StorageSink: Send + Sync {
    async fn exists(&self, path: &str) -> Result<bool>;

    async fn write_binary(&self, path: &str, bytes: &[u8]) -> Result<()>;

    async fn ensure_folder(&self, path: &str) -> Result<()>;
}

/// [`StorageSink`] writing below a root directory on the local filesystem.
#[derive(Debug, Clone)]
pub struct FsStorageSink {
    root: PathBuf,
}

impl FsStorageSink {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Join `path` onto the root, refusing anything that could escape it.
    fn resolve(&self, path: &str) -> Result<PathBuf> {
        let relative = Path::new(path);
        let contained = relative
            .components()
            .all(|c| matches!(c, Component::Normal(_) | Component::CurDir));
        if !contained {
            return Err(HuginnError::Storage(format!(
                "path escapes storage root: {path}"
            )));
        }
        Ok(self.root.join(relative))
    }
}

#[async_trait]
impl StorageSink for FsStorageSink {
    async fn exists(&self, path: &str) -> Result<bool> {
        let full = self.resolve(path)?;
        tokio::fs::try_exists(&full)
            .await
            .map_err(|e| HuginnError::Storage(format!("{}: {e}", full.display())))
    }

    async fn write_binary(&self, path: &str, bytes: &[u8]) -> Result<()> {
        let full = self.resolve(path)?;
        tokio::fs::write(&full, bytes)
            .await
            .map_err(|e| HuginnError::Storage(format!("{}: {e}", full.display())))
    }

    async fn ensure_folder(&self, path: &str) -> Result<()> {
        let full = self.resolve(path)?;
        tokio::fs::create_dir_all(&full)
            .await
            .map_err(|e| HuginnError::Storage(format!("{}: {e}", full.display())))
    }
}
