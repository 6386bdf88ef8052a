//! Multipart parsing for memory forms and the photo side of each write:
//! upload before the record is stored, reap after it has changed.

use axum::extract::{Multipart, multipart::MultipartError};
use axum::http::StatusCode;
use bytes::Bytes;
use futures_util::future::join_all;
use tracing::{info, warn};

use keepsake_blob::{photo_key, reap};

use crate::AppState;
use crate::error::ApiError;

pub const MAX_PHOTOS: usize = 4;

/// Photo handling knobs.
#[derive(Debug, Clone)]
pub struct PhotoPolicy {
    /// Delete the superseded photo set when a memory is updated.
    pub reap_on_update: bool,
    /// Total batch-delete attempts when reaping (at least 1).
    pub delete_attempts: u32,
    /// Request body limit for the multipart routes.
    pub max_upload_bytes: usize,
}

impl Default for PhotoPolicy {
    fn default() -> Self {
        Self {
            reap_on_update: true,
            delete_attempts: 1,
            max_upload_bytes: 40 * 1024 * 1024,
        }
    }
}

pub struct PhotoUpload {
    pub content_type: Option<String>,
    pub data: Bytes,
}

/// Fields of a create/update request: `title`, `info` and up to four `photo`
/// file parts.
pub struct MemoryForm {
    pub title: String,
    pub info: String,
    pub photos: Vec<PhotoUpload>,
}

impl MemoryForm {
    pub async fn from_multipart(mut multipart: Multipart) -> Result<Self, ApiError> {
        let mut title = None;
        let mut info = None;
        let mut photos = Vec::new();

        while let Some(field) = multipart.next_field().await.map_err(malformed)? {
            let name = field.name().unwrap_or_default().to_string();
            match name.as_str() {
                "title" => title = Some(field.text().await.map_err(malformed)?),
                "info" => info = Some(field.text().await.map_err(malformed)?),
                "photo" => {
                    let content_type = field.content_type().map(str::to_string);
                    let data = field.bytes().await.map_err(malformed)?;
                    // Browsers send an empty part when no file was picked.
                    if data.is_empty() {
                        continue;
                    }
                    if photos.len() == MAX_PHOTOS {
                        return Err(ApiError::Validation(format!(
                            "At most {MAX_PHOTOS} photos per memory."
                        )));
                    }
                    photos.push(PhotoUpload { content_type, data });
                }
                other => {
                    return Err(ApiError::Validation(format!("Unexpected field '{other}'.")));
                }
            }
        }

        let title = title
            .filter(|t| !t.trim().is_empty())
            .ok_or_else(|| ApiError::Validation("Missing title.".to_string()))?;

        Ok(Self {
            title,
            info: info.unwrap_or_default(),
            photos,
        })
    }
}

fn malformed(e: MultipartError) -> ApiError {
    if e.status() == StatusCode::PAYLOAD_TOO_LARGE {
        return ApiError::PayloadTooLarge(e.body_text());
    }
    ApiError::Validation(format!("Malformed multipart body: {}", e.body_text()))
}

/// Store every photo under a fresh key and return the keys in upload order.
///
/// Nothing is written to the database here. If any upload fails, the ones
/// that succeeded are discarded before the error is returned.
pub async fn upload(state: &AppState, photos: Vec<PhotoUpload>) -> Result<Vec<String>, ApiError> {
    if photos.is_empty() {
        return Ok(Vec::new());
    }

    let keys: Vec<String> = photos
        .iter()
        .map(|p| photo_key(p.content_type.as_deref()))
        .collect();

    let blobs = state.blobs.as_ref();
    let results = join_all(photos.into_iter().zip(&keys).map(|(photo, key)| async move {
        blobs.put(key, photo.content_type.as_deref(), photo.data).await
    }))
    .await;

    let mut stored = Vec::with_capacity(keys.len());
    let mut first_error = None;
    for (key, result) in keys.iter().zip(results) {
        match result {
            Ok(()) => stored.push(key.clone()),
            Err(e) => {
                warn!("Upload of {} failed: {}", key, e);
                if first_error.is_none() {
                    first_error = Some(e);
                }
            }
        }
    }

    if let Some(e) = first_error {
        discard(state, &stored).await;
        return Err(ApiError::Internal(e.context("photo upload failed")));
    }

    Ok(keys)
}

/// Reap photos that are no longer referenced by any record.
pub async fn reap_stale(state: &AppState, keys: &[String]) -> Result<(), ApiError> {
    reap(state.blobs.as_ref(), keys, state.photos.delete_attempts)
        .await
        .map_err(ApiError::Internal)
}

/// Best-effort removal of photos uploaded for a write that did not land.
/// Failures are logged and otherwise ignored.
pub async fn discard(state: &AppState, keys: &[String]) {
    if keys.is_empty() {
        return;
    }
    match reap(state.blobs.as_ref(), keys, 1).await {
        Ok(()) => info!("Discarded {} unreferenced upload(s)", keys.len()),
        Err(e) => warn!("Orphaned uploads left in blob store: {}", e),
    }
}

/// Keys in `previous` that `current` no longer references, in order.
pub fn superseded(previous: &[String], current: &[String]) -> Vec<String> {
    previous
        .iter()
        .filter(|key| !current.contains(key))
        .cloned()
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::test_state;

    fn upload_of(content_type: &str, data: &'static [u8]) -> PhotoUpload {
        PhotoUpload {
            content_type: Some(content_type.to_string()),
            data: Bytes::from_static(data),
        }
    }

    #[test]
    fn superseded_keeps_order_and_skips_survivors() {
        let previous = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let current = vec!["b".to_string(), "d".to_string()];
        assert_eq!(superseded(&previous, &current), ["a", "c"]);
        assert!(superseded(&[], &current).is_empty());
    }

    #[tokio::test]
    async fn upload_stores_every_photo() {
        let (state, blobs) = test_state();
        let keys = upload(
            &state,
            vec![upload_of("image/png", b"one"), upload_of("image/jpeg", b"two")],
        )
        .await
        .unwrap();

        assert_eq!(keys.len(), 2);
        assert!(keys[0].ends_with(".png"));
        assert!(keys[1].ends_with(".jpeg"));
        let mut expected = keys.clone();
        expected.sort();
        assert_eq!(blobs.keys().await, expected);
    }

    #[tokio::test]
    async fn failed_upload_returns_error() {
        let (state, blobs) = test_state();
        blobs.fail_puts(true).await;

        let err = upload(&state, vec![upload_of("image/png", b"one")]).await.unwrap_err();
        assert!(matches!(err, ApiError::Internal(_)));
        assert!(blobs.keys().await.is_empty());
        // Nothing was stored, so nothing needed discarding.
        assert!(blobs.delete_batches().await.is_empty());
    }

    #[tokio::test]
    async fn discard_ignores_empty_sets() {
        let (state, blobs) = test_state();
        discard(&state, &[]).await;
        assert!(blobs.delete_batches().await.is_empty());
    }
}
