/// Database row types. These map directly to SQLite rows.
/// Distinct from keepsake-types API models to keep the DB layer independent.

#[derive(Debug, Clone)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MemoryRow {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub info: String,
    pub photos: Vec<String>,
    /// RFC 3339, microsecond precision, `Z` suffix. Fixed width, so it sorts
    /// lexicographically in creation order.
    pub created_at: String,
}

/// Result of a scoped update: the record as it was and as it is now.
#[derive(Debug, Clone)]
pub struct MemoryUpdate {
    pub previous: MemoryRow,
    pub current: MemoryRow,
}
