use crate::models::{MemoryRow, MemoryUpdate, UserRow};
use crate::Database;
use anyhow::Result;
use rusqlite::Connection;

const MEMORY_COLUMNS: &str = "id, owner_id, title, info, photos, created_at";

impl Database {
    // -- Users --

    /// Insert a user and return the stored row. A duplicate username fails
    /// with a constraint violation; see [`crate::is_unique_violation`].
    pub fn create_user(&self, id: &str, username: &str, password_hash: &str) -> Result<UserRow> {
        self.with_conn(|conn| {
            let row = conn.query_row(
                "INSERT INTO users (id, username, password) VALUES (?1, ?2, ?3)
                 RETURNING id, username, password, created_at",
                (id, username, password_hash),
                user_from_row,
            )?;
            Ok(row)
        })
    }

    pub fn get_user_by_username(&self, username: &str) -> Result<Option<UserRow>> {
        self.with_conn(|conn| query_user_by_username(conn, username))
    }

    // -- Memories --

    pub fn insert_memory(&self, memory: &MemoryRow) -> Result<()> {
        let photos = serde_json::to_string(&memory.photos)?;
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO memories (id, owner_id, title, info, photos, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                rusqlite::params![
                    memory.id,
                    memory.owner_id,
                    memory.title,
                    memory.info,
                    photos,
                    memory.created_at
                ],
            )?;
            Ok(())
        })
    }

    /// Newest first. Ties on `created_at` fall back to insertion order.
    pub fn list_memories(&self, owner_id: &str, offset: u32, limit: u32) -> Result<Vec<MemoryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "SELECT {MEMORY_COLUMNS} FROM memories
                 WHERE owner_id = ?1
                 ORDER BY created_at DESC, rowid DESC
                 LIMIT ?2 OFFSET ?3"
            );
            let mut stmt = conn.prepare(&sql)?;
            let rows = stmt
                .query_map(rusqlite::params![owner_id, limit, offset], memory_from_row)?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    pub fn get_memory(&self, id: &str, owner_id: &str) -> Result<Option<MemoryRow>> {
        self.with_conn(|conn| query_memory(conn, id, owner_id))
    }

    /// Replace title, info and photos of a memory owned by `owner_id`.
    ///
    /// Returns `None` when no row matches `(id, owner_id)`; a wrong owner is
    /// indistinguishable from a missing id.
    pub fn update_memory(
        &self,
        id: &str,
        owner_id: &str,
        title: &str,
        info: &str,
        photos: &[String],
    ) -> Result<Option<MemoryUpdate>> {
        let photos_json = serde_json::to_string(photos)?;
        self.with_conn(|conn| {
            let tx = conn.unchecked_transaction()?;

            let Some(previous) = query_memory(&tx, id, owner_id)? else {
                return Ok(None);
            };

            tx.execute(
                "UPDATE memories SET title = ?1, info = ?2, photos = ?3
                 WHERE id = ?4 AND owner_id = ?5",
                rusqlite::params![title, info, photos_json, id, owner_id],
            )?;
            tx.commit()?;

            let current = MemoryRow {
                title: title.to_string(),
                info: info.to_string(),
                photos: photos.to_vec(),
                ..previous.clone()
            };
            Ok(Some(MemoryUpdate { previous, current }))
        })
    }

    /// Delete a memory owned by `owner_id` and return the removed row so its
    /// photos can be reaped.
    pub fn delete_memory(&self, id: &str, owner_id: &str) -> Result<Option<MemoryRow>> {
        self.with_conn(|conn| {
            let sql = format!(
                "DELETE FROM memories WHERE id = ?1 AND owner_id = ?2 RETURNING {MEMORY_COLUMNS}"
            );
            conn.query_row(&sql, [id, owner_id], memory_from_row).optional()
        })
    }
}

fn user_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<UserRow> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn memory_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<MemoryRow> {
    let photos: String = row.get(4)?;
    let photos = serde_json::from_str(&photos).map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(4, rusqlite::types::Type::Text, Box::new(e))
    })?;

    Ok(MemoryRow {
        id: row.get(0)?,
        owner_id: row.get(1)?,
        title: row.get(2)?,
        info: row.get(3)?,
        photos,
        created_at: row.get(5)?,
    })
}

fn query_user_by_username(conn: &Connection, username: &str) -> Result<Option<UserRow>> {
    let mut stmt =
        conn.prepare("SELECT id, username, password, created_at FROM users WHERE username = ?1")?;

    stmt.query_row([username], user_from_row).optional()
}

fn query_memory(conn: &Connection, id: &str, owner_id: &str) -> Result<Option<MemoryRow>> {
    let sql = format!("SELECT {MEMORY_COLUMNS} FROM memories WHERE id = ?1 AND owner_id = ?2");
    let mut stmt = conn.prepare(&sql)?;

    stmt.query_row([id, owner_id], memory_from_row).optional()
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
