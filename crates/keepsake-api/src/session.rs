use std::time::Duration;

use jsonwebtoken::{Algorithm, DecodingKey, EncodingKey, Header, Validation, decode, encode};
use uuid::Uuid;

use keepsake_types::api::Claims;

use crate::error::AuthError;

/// Longest token lifetime accepted from configuration (about a century).
pub const MAX_TOKEN_TTL: Duration = Duration::from_secs(100 * 365 * 24 * 60 * 60);

/// Issues and verifies stateless HS256 identity tokens.
///
/// Tokens carry no expiry unless a lifetime is configured. When they do carry
/// `exp` it is always enforced.
#[derive(Clone)]
pub struct SessionIssuer {
    encoding: EncodingKey,
    decoding: DecodingKey,
    ttl: Option<Duration>,
}

impl SessionIssuer {
    pub fn new(secret: &str, ttl: Option<Duration>) -> Self {
        Self {
            encoding: EncodingKey::from_secret(secret.as_bytes()),
            decoding: DecodingKey::from_secret(secret.as_bytes()),
            ttl,
        }
    }

    pub fn issue(&self, user_id: Uuid, username: &str) -> anyhow::Result<String> {
        let exp = match self.ttl {
            Some(ttl) => {
                let now = chrono::Utc::now().timestamp().max(0) as u64;
                let exp = now
                    .checked_add(ttl.as_secs())
                    .ok_or_else(|| anyhow::anyhow!("token lifetime of {:?} overflows exp", ttl))?;
                Some(exp)
            }
            None => None,
        };

        let claims = Claims {
            sub: user_id,
            username: username.to_string(),
            exp,
        };

        let token = encode(&Header::new(Algorithm::HS256), &claims, &self.encoding)?;
        Ok(token)
    }

    pub fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::new(Algorithm::HS256);
        if self.ttl.is_none() {
            validation.required_spec_claims.clear();
        }

        decode::<Claims>(token, &self.decoding, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken)
    }
}
