//! In-process blob store.
//!
//! Keeps objects in a map and records every batch-delete request so callers
//! can assert on exactly what was reaped.

use anyhow::{Result, bail};
use async_trait::async_trait;
use bytes::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

use crate::{BatchDelete, BlobStore};

#[derive(Default)]
struct Inner {
    objects: HashMap<String, Bytes>,
    delete_batches: Vec<Vec<String>>,
    /// key -> number of upcoming delete attempts that should fail
    failing_deletes: HashMap<String, u32>,
    fail_puts: bool,
}

#[derive(Clone, Default)]
pub struct MemoryBlobStore {
    inner: Arc<RwLock<Inner>>,
}

impl MemoryBlobStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every `delete_many` call so far, in order.
    pub async fn delete_batches(&self) -> Vec<Vec<String>> {
        self.inner.read().await.delete_batches.clone()
    }

    pub async fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.inner.read().await.objects.keys().cloned().collect();
        keys.sort();
        keys
    }

    /// Make the next `times` deletes of `key` fail.
    pub async fn fail_deletes(&self, key: &str, times: u32) {
        self.inner
            .write()
            .await
            .failing_deletes
            .insert(key.to_string(), times);
    }

    pub async fn fail_puts(&self, fail: bool) {
        self.inner.write().await.fail_puts = fail;
    }
}

#[async_trait]
impl BlobStore for MemoryBlobStore {
    async fn put(&self, key: &str, _content_type: Option<&str>, data: Bytes) -> Result<()> {
        let mut inner = self.inner.write().await;
        if inner.fail_puts {
            bail!("Blob store rejected upload of {}", key);
        }
        inner.objects.insert(key.to_string(), data);
        Ok(())
    }

    async fn delete_many(&self, keys: &[String]) -> Result<BatchDelete> {
        let mut inner = self.inner.write().await;
        inner.delete_batches.push(keys.to_vec());

        let mut report = BatchDelete::default();
        for key in keys {
            if let Some(remaining) = inner.failing_deletes.get_mut(key) {
                if *remaining > 0 {
                    *remaining -= 1;
                    report.failed.push((key.clone(), "access denied".to_string()));
                    continue;
                }
            }
            inner.objects.remove(key);
            report.deleted.push(key.clone());
        }
        Ok(report)
    }

    async fn exists(&self, key: &str) -> Result<bool> {
        Ok(self.inner.read().await.objects.contains_key(key))
    }
}
