use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Public view of an account. The password hash never leaves the DB layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: Uuid,
    pub username: String,
    pub created_at: DateTime<Utc>,
}

/// A journal entry owned by exactly one user.
///
/// `photos` holds blob-store keys in upload order (0 to 4 entries).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Memory {
    pub id: Uuid,
    pub owner_id: Uuid,
    pub title: String,
    pub info: String,
    pub photos: Vec<String>,
    pub created_at: DateTime<Utc>,
}
