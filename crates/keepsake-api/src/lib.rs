pub mod auth;
pub mod credentials;
pub mod error;
pub mod memories;
pub mod middleware;
pub mod photos;
pub mod session;

#[cfg(test)]
pub(crate) mod test_support;

use axum::{
    Json, Router,
    extract::DefaultBodyLimit,
    middleware::from_fn_with_state,
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use tracing::warn;

use keepsake_db::Database;

pub use auth::{AppState, AppStateInner};
pub use error::ApiError;
pub use photos::PhotoPolicy;
pub use session::{MAX_TOKEN_TTL, SessionIssuer};

/// Build the full HTTP surface. Everything under `/secure` goes through
/// [`middleware::require_auth`] first.
pub fn router(state: AppState) -> Router {
    let public_routes = Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/health", get(health));

    let secure_routes = Router::new()
        .route(
            "/memory",
            get(memories::list_memories).post(memories::create_memory),
        )
        .route(
            "/memory/{memory_id}",
            get(memories::get_memory)
                .put(memories::update_memory)
                .delete(memories::delete_memory),
        )
        .layer(DefaultBodyLimit::max(state.photos.max_upload_bytes))
        .layer(from_fn_with_state(state.clone(), middleware::require_auth));

    Router::new()
        .merge(public_routes)
        .nest("/secure", secure_routes)
        .with_state(state)
}

async fn health() -> Json<serde_json::Value> {
    Json(serde_json::json!({ "status": "ok" }))
}

/// Run a blocking database call off the async runtime.
pub(crate) async fn blocking<F, T>(state: &AppState, f: F) -> anyhow::Result<T>
where
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let state = state.clone();
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| anyhow::anyhow!("spawn_blocking join error: {}", e))?
}

/// Parse a stored timestamp. Accepts RFC 3339 and SQLite's
/// `datetime('now')` format; anything else is logged and replaced with the
/// epoch.
pub(crate) fn parse_timestamp(raw: &str) -> DateTime<Utc> {
    raw.parse::<DateTime<Utc>>()
        .or_else(|_| {
            // SQLite stores timestamps as "YYYY-MM-DD HH:MM:SS" without timezone.
            chrono::NaiveDateTime::parse_from_str(raw, "%Y-%m-%d %H:%M:%S").map(|ndt| ndt.and_utc())
        })
        .unwrap_or_else(|e| {
            warn!("Corrupt timestamp '{}': {}", raw, e);
            DateTime::default()
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_both_timestamp_formats() {
        let rfc = parse_timestamp("2026-03-01T10:20:30.123456Z");
        assert_eq!(rfc.to_rfc3339(), "2026-03-01T10:20:30.123456+00:00");

        let sqlite = parse_timestamp("2026-03-01 10:20:30");
        assert_eq!(sqlite.to_rfc3339(), "2026-03-01T10:20:30+00:00");

        assert_eq!(parse_timestamp("yesterday"), DateTime::<Utc>::default());
    }
}
