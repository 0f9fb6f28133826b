//! Filesystem-backed document storage (spec §6 "Storage adapter").

use async_trait::async_trait;
use relayboard_domain::error::{Error, Result};
use relayboard_domain::ports::StorageAdapter;
use std::path::{Path, PathBuf};
use uuid::Uuid;

/// Stores document bytes under `root_dir/<project_id>/<storage_id>`.
pub struct FsStorageAdapter {
    root_dir: PathBuf,
}

impl FsStorageAdapter {
    /// Construct an adapter rooted at `root_dir`.
    #[must_use]
    pub fn new(root_dir: impl Into<PathBuf>) -> Self {
        Self { root_dir: root_dir.into() }
    }

    fn resolve(&self, storage_id: &str) -> Result<PathBuf> {
        // storage_id is "<project_id>/<uuid>"; reject anything that would
        // escape root_dir via traversal.
        if storage_id.contains("..") {
            return Err(Error::invalid_argument("storage id must not contain '..'"));
        }
        Ok(self.root_dir.join(storage_id))
    }
}

#[async_trait]
impl StorageAdapter for FsStorageAdapter {
    async fn read(&self, storage_id: &str) -> Result<Vec<u8>> {
        let path = self.resolve(storage_id)?;
        tokio::fs::read(&path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::not_found(format!("file not found in storage: {storage_id}"))
            } else {
                Error::internal(format!("reading {storage_id}: {e}"))
            }
        })
    }

    async fn save(&self, bytes: &[u8], filename: &str, project_id: &str) -> Result<String> {
        let extension = Path::new(filename).extension().and_then(|e| e.to_str()).unwrap_or("bin");
        let storage_id = format!("{project_id}/{}.{extension}", Uuid::new_v4());
        let path = self.resolve(&storage_id)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| Error::internal(format!("creating storage directory: {e}")))?;
        }
        tokio::fs::write(&path, bytes).await.map_err(|e| Error::internal(format!("writing {storage_id}: {e}")))?;
        Ok(storage_id)
    }

    async fn delete(&self, storage_id: &str) -> Result<()> {
        let path = self.resolve(storage_id)?;
        match tokio::fs::remove_file(&path).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::internal(format!("deleting {storage_id}: {e}"))),
        }
    }

    async fn exists(&self, storage_id: &str) -> Result<bool> {
        let path = self.resolve(storage_id)?;
        Ok(tokio::fs::try_exists(&path).await.unwrap_or(false))
    }
}
