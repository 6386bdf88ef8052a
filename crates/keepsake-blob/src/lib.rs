//! Blob storage for memory photos.
//!
//! Photos are written under opaque keys before the owning record is stored,
//! and removed in batches once the record that referenced them is gone.

pub mod disk;
pub mod memory;
pub mod reap;

use anyhow::Result;
use async_trait::async_trait;
use bytes::Bytes;
use uuid::Uuid;

pub use disk::DiskBlobStore;
pub use memory::MemoryBlobStore;
pub use reap::reap;

/// Outcome of a batch delete. Each key either lands in `deleted` or in
/// `failed` together with the reason.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct BatchDelete {
    pub deleted: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl BatchDelete {
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    pub fn failed_keys(&self) -> Vec<String> {
        self.failed.iter().map(|(key, _)| key.clone()).collect()
    }
}

#[async_trait]
pub trait BlobStore: Send + Sync {
    /// Store `data` under `key`, replacing anything already there.
    async fn put(&self, key: &str, content_type: Option<&str>, data: Bytes) -> Result<()>;

    /// Delete every key in one request. Keys that are already gone count as
    /// deleted. `Err` means the request itself failed and nothing is known
    /// about individual keys.
    async fn delete_many(&self, keys: &[String]) -> Result<BatchDelete>;

    async fn exists(&self, key: &str) -> Result<bool>;
}

/// Fresh key for an uploaded photo: `photos/<uuid>.<ext>`.
pub fn photo_key(content_type: Option<&str>) -> String {
    format!("photos/{}.{}", Uuid::new_v4(), extension_for(content_type))
}

fn extension_for(content_type: Option<&str>) -> &'static str {
    let essence = content_type
        .and_then(|ct| ct.split(';').next())
        .map(|ct| ct.trim().to_ascii_lowercase());

    match essence.as_deref() {
        Some("image/jpeg") | Some("image/jpg") => "jpeg",
        Some("image/png") => "png",
        Some("image/gif") => "gif",
        Some("image/webp") => "webp",
        Some("image/heic") => "heic",
        Some("image/heif") => "heif",
        Some("image/bmp") => "bmp",
        Some("image/tiff") => "tiff",
        Some("image/svg+xml") => "svg",
        _ => "bin",
    }
}
