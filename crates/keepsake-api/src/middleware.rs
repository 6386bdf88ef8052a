use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::AppState;
use crate::error::ApiError;

/// Request header that carries the identity token.
pub const TOKEN_HEADER: &str = "access-token";

/// Extract and validate the identity token from the `access-token` header.
///
/// On success the decoded [`keepsake_types::api::Claims`] are inserted as a
/// request extension; handlers read the caller's id from there and never from
/// the request body.
pub async fn require_auth(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = req
        .headers()
        .get(TOKEN_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or(ApiError::InvalidToken)?;

    let claims = state.sessions.verify(token)?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
