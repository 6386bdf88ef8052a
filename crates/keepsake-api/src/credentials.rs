//! Account registration and password authentication.
//!
//! Passwords are hashed with Argon2id (random salt, PHC string). Hashing and
//! verification are slow by design and run on the blocking pool.

use std::sync::LazyLock;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{self, SaltString},
};
use rand_core::OsRng;
use uuid::Uuid;

use keepsake_db::is_unique_violation;
use keepsake_db::models::UserRow;
use keepsake_types::models::User;

use crate::error::{AuthError, RegisterError};
use crate::{AppState, blocking, parse_timestamp};

/// Verified against on the unknown-username path so a miss costs one Argon2
/// run, the same as a wrong password.
static DUMMY_HASH: LazyLock<Option<String>> =
    LazyLock::new(|| hash_password("keepsake-unknown-user").ok());

/// Usernames are limited to letters, digits, `_`, `.` and `-`.
pub fn valid_username(username: &str) -> bool {
    !username.trim().is_empty()
        && username
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '.' | '-'))
}

pub async fn register(
    state: &AppState,
    username: Option<String>,
    password: Option<String>,
) -> Result<User, RegisterError> {
    let username = username
        .filter(|u| valid_username(u))
        .ok_or(RegisterError::MissingUsername)?;
    let password = password
        .filter(|p| !p.trim().is_empty())
        .ok_or(RegisterError::MissingPassword)?;

    let password_hash = tokio::task::spawn_blocking(move || hash_password(&password))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    let user_id = Uuid::new_v4();
    let row = blocking(state, move |db| {
        db.create_user(&user_id.to_string(), &username, &password_hash)
    })
    .await
    .map_err(|e| {
        if is_unique_violation(&e) {
            RegisterError::UsernameTaken
        } else {
            RegisterError::Internal(e)
        }
    })?;

    Ok(user_from_row(row))
}

/// Check a username/password pair. Every mismatch, including an unknown
/// username, is reported as [`AuthError::InvalidCredentials`].
pub async fn authenticate(
    state: &AppState,
    username: Option<String>,
    password: Option<String>,
) -> Result<User, AuthError> {
    let (Some(username), Some(password)) = (username, password) else {
        return Err(AuthError::InvalidCredentials);
    };

    let lookup = username.clone();
    let Some(user) = blocking(state, move |db| db.get_user_by_username(&lookup)).await? else {
        tokio::task::spawn_blocking(move || {
            if let Some(dummy) = DUMMY_HASH.as_deref() {
                let _ = verify_password(&password, dummy);
            }
        })
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?;
        tracing::debug!("Login for unknown username '{}'", username);
        return Err(AuthError::InvalidCredentials);
    };

    let stored_hash = user.password.clone();
    let verified = tokio::task::spawn_blocking(move || verify_password(&password, &stored_hash))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))??;

    if !verified {
        return Err(AuthError::InvalidCredentials);
    }

    Ok(user_from_row(user))
}

fn hash_password(password: &str) -> anyhow::Result<String> {
    let salt = SaltString::generate(&mut OsRng);
    let hash = Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map_err(|e| anyhow::anyhow!("Password hashing failed: {}", e))?
        .to_string();
    Ok(hash)
}

/// `Ok(false)` on mismatch; `Err` only when the stored hash is unreadable.
fn verify_password(password: &str, stored_hash: &str) -> anyhow::Result<bool> {
    let parsed = PasswordHash::new(stored_hash)
        .map_err(|e| anyhow::anyhow!("Stored password hash is corrupt: {}", e))?;

    match Argon2::default().verify_password(password.as_bytes(), &parsed) {
        Ok(()) => Ok(true),
        Err(password_hash::Error::Password) => Ok(false),
        Err(e) => Err(anyhow::anyhow!("Password verification failed: {}", e)),
    }
}

fn user_from_row(row: UserRow) -> User {
    User {
        id: row.id.parse().unwrap_or_else(|e| {
            tracing::warn!("Corrupt user id '{}': {}", row.id, e);
            Uuid::default()
        }),
        created_at: parse_timestamp(&row.created_at),
        username: row.username,
    }
}
