use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation, decode, encode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

/// JWT claims shared across harbor-api (cookie middleware) and
/// harbor-gateway (WebSocket handshake). Canonical definition lives here
/// to eliminate duplication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub exp: usize,
}

/// Session token verification outcomes. A malformed token supplied by a
/// client is a recoverable error, never a fault.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum AuthError {
    #[error("no session token supplied")]
    Missing,
    #[error("session token could not be decoded")]
    Malformed,
    #[error("session token signature is invalid")]
    InvalidSignature,
}

/// Sign a session token binding `user_id` and `username`. Tokens expire
/// after 30 days; the transport-side cookie lifetime is shorter in practice.
pub fn issue(
    secret: &str,
    user_id: Uuid,
    username: &str,
) -> Result<String, jsonwebtoken::errors::Error> {
    let claims = Claims {
        sub: user_id,
        username: username.to_string(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
}

/// Verify a session token and return its claims.
pub fn verify(secret: &str, token: &str) -> Result<Claims, AuthError> {
    decode::<Claims>(
        token,
        &DecodingKey::from_secret(secret.as_bytes()),
        &Validation::default(),
    )
    .map(|data| data.claims)
    .map_err(|e| match e.kind() {
        jsonwebtoken::errors::ErrorKind::InvalidSignature => AuthError::InvalidSignature,
        _ => AuthError::Malformed,
    })
}
