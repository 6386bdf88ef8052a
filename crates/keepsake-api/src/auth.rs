use std::sync::Arc;

use axum::{
    Json,
    extract::{State, rejection::JsonRejection},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::info;

use keepsake_blob::BlobStore;
use keepsake_db::Database;
use keepsake_types::api::{LoginRequest, LoginResponse, RegisterRequest};

use crate::credentials;
use crate::error::ApiError;
use crate::photos::PhotoPolicy;
use crate::session::SessionIssuer;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub blobs: Arc<dyn BlobStore>,
    pub sessions: SessionIssuer,
    pub photos: PhotoPolicy,
}

/// POST /register: create an account. Returns the user without its hash.
pub async fn register(
    State(state): State<AppState>,
    req: Result<Json<RegisterRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = req?;

    let user = credentials::register(&state, req.username, req.password).await?;
    info!("Registered user {} ({})", user.username, user.id);

    Ok((StatusCode::CREATED, Json(user)))
}

/// POST /login: exchange credentials for an identity token.
pub async fn login(
    State(state): State<AppState>,
    req: Result<Json<LoginRequest>, JsonRejection>,
) -> Result<impl IntoResponse, ApiError> {
    let Json(req) = req?;

    let user = credentials::authenticate(&state, req.username, req.password).await?;
    let token = state.sessions.issue(user.id, &user.username)?;

    Ok(Json(LoginResponse {
        user_id: user.id,
        username: user.username,
        token,
    }))
}
