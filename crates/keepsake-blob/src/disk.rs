use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::{debug, info, warn};

use crate::{BatchDelete, BlobStore};

/// Blob store backed by a local directory.
///
/// Each key maps to `{root}/{key}`; the `photos/` prefix becomes a
/// subdirectory.
pub struct DiskBlobStore {
    root: PathBuf,
}

impl DiskBlobStore {
    pub async fn new(root: PathBuf) -> Result<Self> {
        fs::create_dir_all(&root).await?;
        info!("Blob storage directory: {}", root.display());
        Ok(Self { root })
    }

    /// Resolve a key to a path under the root. Keys are relative paths made
    /// of plain components only.
    pub fn path_for(&self, key: &str) -> Result<PathBuf> {
        let rel = Path::new(key);
        if key.is_empty() || !rel.components().all(|c| matches!(c, Component::Normal(_))) {
            bail!("Invalid blob key: {:?}", key);
        }
        Ok(self.root.join(rel))
    }

    async fn delete_one(&self, key: &str) -> Result<()> {
        let path = self.path_for(key)?;
        match fs::remove_file(&path).await {
            Ok(()) => {
                debug!("Deleted blob {}", key);
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("Blob {} already gone", key);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[async_trait]
impl BlobStore for DiskBlobStore {
    async fn put(&self, key: &str, _content_type: Option<&str>, data: Bytes) -> Result<()> {
        let path = self.path_for(key)?;
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await?;
        }

        let mut file = fs::File::create(&path).await?;
        file.write_all(&data).await?;
        file.flush().await?;

        debug!("Stored blob {} ({} bytes)", key, data.len());
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<BatchDelete> {
        let mut report = BatchDelete::default();
        for key in keys {
            match self.delete_one(key).await {
                Ok(()) => report.deleted.push(key.clone()),
                Err(e) => report.failed.push((key.clone(), e.to_string())),
            }
        }
        Ok(report)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        let path = self.path_for(key)?;
        Ok(fs::try_exists(&path).await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, DiskBlobStore) {
        let dir = tempfile::tempdir().unwrap();
        let store = DiskBlobStore::new(dir.path().join("blobs")).await.unwrap();
        (dir, store)
    }

    #[tokio::test]
    async fn put_then_delete() {
        let (_dir, store) = store().await;
        store
            .put("photos/a.png", Some("image/png"), Bytes::from_static(b"png"))
            .await
            .unwrap();
        assert!(store.exists("photos/a.png").await.unwrap());

        let on_disk = tokio::fs::read(store.path_for("photos/a.png").unwrap()).await.unwrap();
        assert_eq!(on_disk, b"png");

        let report = store.delete_many(&["photos/a.png".to_string()]).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.deleted, ["photos/a.png"]);
        assert!(!store.exists("photos/a.png").await.unwrap());
    }

    #[tokio::test]
    async fn deleting_missing_key_counts_as_deleted() {
        let (_dir, store) = store().await;
        let report = store.delete_many(&["photos/never.png".to_string()]).await.unwrap();
        assert!(report.is_complete());
        assert_eq!(report.deleted, ["photos/never.png"]);
    }

    #[tokio::test]
    async fn bad_keys_fail_individually() {
        let (_dir, store) = store().await;
        store.put("photos/ok.png", None, Bytes::from_static(b"x")).await.unwrap();

        let report = store
            .delete_many(&["../escape".to_string(), "photos/ok.png".to_string()])
            .await
            .unwrap();
        assert_eq!(report.deleted, ["photos/ok.png"]);
        assert_eq!(report.failed_keys(), ["../escape"]);
    }

    #[tokio::test]
    async fn rejects_traversal_and_absolute_keys() {
        let (_dir, store) = store().await;
        assert!(store.path_for("../etc/passwd").is_err());
        assert!(store.path_for("/etc/passwd").is_err());
        assert!(store.path_for("").is_err());
        assert!(store.put("photos/../../x", None, Bytes::new()).await.is_err());
    }
}
