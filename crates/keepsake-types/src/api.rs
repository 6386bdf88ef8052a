use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Session claims --

/// Claims carried by the `access-token` header. `exp` is only present when the
/// server is configured with a token lifetime.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exp: Option<u64>,
}

// -- Auth --

/// Both fields are optional on the wire so that a missing field is reported
/// as a validation error instead of a body rejection.
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: Option<String>,
    pub password: Option<String>,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct LoginResponse {
    pub user_id: Uuid,
    pub username: String,
    pub token: String,
}

// -- Memories --

#[derive(Debug, Default, Deserialize)]
pub struct ListMemoriesQuery {
    #[serde(default)]
    pub offset: u32,
}

// -- Errors --

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
}
