use axum::{
    Json,
    extract::{
        multipart::MultipartRejection,
        rejection::{JsonRejection, QueryRejection},
    },
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use keepsake_types::api::ErrorBody;

/// Registration failures, in the order they are checked.
#[derive(Debug, Error)]
pub enum RegisterError {
    #[error("Missing/Invalid username.")]
    MissingUsername,
    #[error("Missing password.")]
    MissingPassword,
    #[error("Username already exists.")]
    UsernameTaken,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Authentication failures. An unknown username and a wrong password are the
/// same `InvalidCredentials` so a caller cannot tell which accounts exist.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid token.")]
    InvalidToken,
    #[error("Invalid password/username.")]
    InvalidCredentials,
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

/// Terminal error for every handler; one variant per response status.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),
    #[error("Invalid token.")]
    InvalidToken,
    #[error("Invalid password/username.")]
    InvalidCredentials,
    #[error("Username already exists.")]
    UsernameTaken,
    #[error("Memory does not exist.")]
    MemoryGone,
    #[error("{0}")]
    PayloadTooLarge(String),
    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match self {
            Self::Validation(_) => StatusCode::BAD_REQUEST,
            Self::InvalidToken | Self::InvalidCredentials => StatusCode::UNAUTHORIZED,
            Self::UsernameTaken => StatusCode::CONFLICT,
            Self::MemoryGone => StatusCode::GONE,
            Self::PayloadTooLarge(_) => StatusCode::PAYLOAD_TOO_LARGE,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Internal(e) => {
                // Underlying store errors stay in the log, not the response.
                error!("Internal error: {:#}", e);
                "Internal server error".to_string()
            }
            other => other.to_string(),
        };
        (status, Json(ErrorBody { error: message })).into_response()
    }
}

impl From<RegisterError> for ApiError {
    fn from(err: RegisterError) -> Self {
        match err {
            RegisterError::UsernameTaken => Self::UsernameTaken,
            RegisterError::Internal(e) => Self::Internal(e),
            other => Self::Validation(other.to_string()),
        }
    }
}

impl From<AuthError> for ApiError {
    fn from(err: AuthError) -> Self {
        match err {
            AuthError::InvalidToken => Self::InvalidToken,
            AuthError::InvalidCredentials => Self::InvalidCredentials,
            AuthError::Internal(e) => Self::Internal(e),
        }
    }
}

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<MultipartRejection> for ApiError {
    fn from(rejection: MultipartRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        Self::Validation(rejection.body_text())
    }
}
