use axum::{extract::Request, http::StatusCode, middleware::Next, response::Response};
use axum_extra::extract::cookie::CookieJar;
use tracing::debug;

use harbor_types::token::{self, AuthError};

use crate::auth::SESSION_COOKIE;

/// Extract and verify the session token cookie. Requests without a valid
/// token get a 401; a bad token never faults the process.
pub async fn require_auth(
    jar: CookieJar,
    mut req: Request,
    next: Next,
) -> Result<Response, StatusCode> {
    let secret =
        std::env::var("HARBOR_JWT_SECRET").unwrap_or_else(|_| "dev-secret-change-me".into());

    let claims = match jar.get(SESSION_COOKIE) {
        None => Err(AuthError::Missing),
        Some(cookie) => token::verify(&secret, cookie.value()),
    }
    .map_err(|e| {
        debug!("rejecting request: {e}");
        StatusCode::UNAUTHORIZED
    })?;

    req.extensions_mut().insert(claims);
    Ok(next.run(req).await)
}
