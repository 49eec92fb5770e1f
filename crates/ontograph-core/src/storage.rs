//! Filesystem object storage
//!
//! Containers map to directories under a root; objects are files.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use tracing::debug;

use crate::{ObjectStorage, OntographError, Result, StorageConfig};

/// Object storage backed by a local directory tree
#[derive(Debug, Clone)]
pub struct LocalObjectStorage {
    root: PathBuf,
}

impl LocalObjectStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// Create from config
    pub fn from_config(config: &StorageConfig) -> Self {
        Self::new(config.root.clone())
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn object_path(&self, container: &str, name: &str) -> Result<PathBuf> {
        for part in [container, name] {
            if part.is_empty() || part.contains("..") || Path::new(part).is_absolute() {
                return Err(OntographError::StorageError(format!(
                    "Invalid object path component: '{part}'"
                )));
            }
        }
        Ok(self.root.join(container).join(name))
    }

    /// Write bytes directly as an object
    pub async fn put_object(&self, container: &str, name: &str, bytes: &[u8]) -> Result<()> {
        let path = self.object_path(container, name)?;
        if let Some(parent) = path.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                OntographError::StorageError(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        tokio::fs::write(&path, bytes).await.map_err(|e| {
            OntographError::StorageError(format!("Failed to write {}: {e}", path.display()))
        })
    }

    /// Read an object's bytes
    pub async fn get_object(&self, container: &str, name: &str) -> Result<Vec<u8>> {
        let path = self.object_path(container, name)?;
        tokio::fs::read(&path).await.map_err(|e| {
            OntographError::StorageError(format!("Failed to read {}: {e}", path.display()))
        })
    }
}

#[async_trait]
impl ObjectStorage for LocalObjectStorage {
    async fn container_exists(&self, container: &str) -> Result<bool> {
        let path = self.root.join(container);
        Ok(tokio::fs::metadata(&path)
            .await
            .map(|m| m.is_dir())
            .unwrap_or(false))
    }

    async fn create_container(&self, container: &str) -> Result<()> {
        let path = self.root.join(container);
        tokio::fs::create_dir_all(&path).await.map_err(|e| {
            OntographError::StorageError(format!("Failed to create container {container}: {e}"))
        })
    }

    async fn download_object(&self, container: &str, name: &str, destination: &Path) -> Result<()> {
        let source = self.object_path(container, name)?;
        if let Some(parent) = destination.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                OntographError::StorageError(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        tokio::fs::copy(&source, destination).await.map_err(|e| {
            OntographError::StorageError(format!("Failed to download {container}/{name}: {e}"))
        })?;
        debug!(container, name, destination = %destination.display(), "Downloaded object");
        Ok(())
    }

    async fn upload_object(&self, container: &str, name: &str, source: &Path) -> Result<()> {
        let target = self.object_path(container, name)?;
        if let Some(parent) = target.parent() {
            tokio::fs::create_dir_all(parent).await.map_err(|e| {
                OntographError::StorageError(format!("Failed to create {}: {e}", parent.display()))
            })?;
        }
        tokio::fs::copy(source, &target).await.map_err(|e| {
            OntographError::StorageError(format!("Failed to upload {container}/{name}: {e}"))
        })?;
        debug!(container, name, source = %source.display(), "Uploaded object");
        Ok(())
    }

    async fn cleanup(&self) -> Result<()> {
        Ok(())
    }
}
