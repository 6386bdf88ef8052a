use axum::{
    Extension, Json,
    extract::{
        Multipart, Path, Query, State, multipart::MultipartRejection, rejection::QueryRejection,
    },
    http::StatusCode,
    response::IntoResponse,
};
use chrono::SecondsFormat;
use tracing::{info, warn};
use uuid::Uuid;

use keepsake_db::models::MemoryRow;
use keepsake_types::api::{Claims, ListMemoriesQuery};
use keepsake_types::models::Memory;

use crate::error::ApiError;
use crate::photos::{self, MemoryForm};
use crate::{AppState, blocking, parse_timestamp};

/// Memories returned per page of `GET /secure/memory`.
pub const PAGE_SIZE: u32 = 5;

/// POST /secure/memory: upload photos, then store the record.
pub async fn create_memory(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let form = MemoryForm::from_multipart(multipart?).await?;
    let photos = photos::upload(&state, form.photos).await?;

    let row = MemoryRow {
        id: Uuid::new_v4().to_string(),
        owner_id: claims.sub.to_string(),
        title: form.title,
        info: form.info,
        photos: photos.clone(),
        created_at: chrono::Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true),
    };

    let insert = row.clone();
    if let Err(e) = blocking(&state, move |db| db.insert_memory(&insert)).await {
        photos::discard(&state, &photos).await;
        return Err(e.into());
    }

    info!(
        "Memory {} created by {} with {} photo(s)",
        row.id,
        claims.username,
        row.photos.len()
    );
    Ok((StatusCode::CREATED, Json(memory_from_row(row))))
}

/// GET /secure/memory?offset=N: the caller's memories, newest first.
pub async fn list_memories(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    query: Result<Query<ListMemoriesQuery>, QueryRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Query(query) = query?;
    let owner_id = claims.sub.to_string();

    let rows = blocking(&state, move |db| {
        db.list_memories(&owner_id, query.offset, PAGE_SIZE)
    })
    .await?;

    let memories: Vec<Memory> = rows.into_iter().map(memory_from_row).collect();
    Ok(Json(memories))
}

/// GET /secure/memory/{memory_id}
pub async fn get_memory(
    State(state): State<AppState>,
    Path(memory_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = claims.sub.to_string();

    let row = blocking(&state, move |db| db.get_memory(&memory_id, &owner_id))
        .await?
        .ok_or(ApiError::MemoryGone)?;

    Ok(Json(memory_from_row(row)))
}

/// PUT /secure/memory/{memory_id}: replace title, info and the photo set.
///
/// New photos are uploaded first. Once the record has changed, the photos it
/// no longer references are reaped if the policy says so.
pub async fn update_memory(
    State(state): State<AppState>,
    Path(memory_id): Path<String>,
    Extension(claims): Extension<Claims>,
    multipart: Result<Multipart, MultipartRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let form = MemoryForm::from_multipart(multipart?).await?;
    let photos = photos::upload(&state, form.photos).await?;

    let owner_id = claims.sub.to_string();
    let new_photos = photos.clone();
    let outcome = blocking(&state, move |db| {
        db.update_memory(&memory_id, &owner_id, &form.title, &form.info, &new_photos)
    })
    .await;

    let update = match outcome {
        Ok(Some(update)) => update,
        Ok(None) => {
            photos::discard(&state, &photos).await;
            return Err(ApiError::MemoryGone);
        }
        Err(e) => {
            photos::discard(&state, &photos).await;
            return Err(e.into());
        }
    };

    let stale = photos::superseded(&update.previous.photos, &update.current.photos);
    if state.photos.reap_on_update {
        photos::reap_stale(&state, &stale).await?;
    } else if !stale.is_empty() {
        warn!(
            "Memory {} updated; leaving {} superseded photo(s) in the blob store",
            update.current.id,
            stale.len()
        );
    }

    info!("Memory {} updated by {}", update.current.id, claims.username);
    Ok(Json(memory_from_row(update.current)))
}

/// DELETE /secure/memory/{memory_id}: remove the record, then its photos.
pub async fn delete_memory(
    State(state): State<AppState>,
    Path(memory_id): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, ApiError> {
    let owner_id = claims.sub.to_string();

    let deleted = blocking(&state, move |db| db.delete_memory(&memory_id, &owner_id))
        .await?
        .ok_or(ApiError::MemoryGone)?;

    photos::reap_stale(&state, &deleted.photos).await?;

    info!("Memory {} deleted by {}", deleted.id, claims.username);
    Ok(Json(serde_json::json!({})))
}

fn memory_from_row(row: MemoryRow) -> Memory {
    Memory {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt memory id '{}': {}", row.id, e);
            Uuid::default()
        }),
        owner_id: row.owner_id.parse().unwrap_or_else(|e| {
            warn!("Corrupt owner_id '{}' on memory '{}': {}", row.owner_id, row.id, e);
            Uuid::default()
        }),
        created_at: parse_timestamp(&row.created_at),
        title: row.title,
        info: row.info,
        photos: row.photos,
    }
}
