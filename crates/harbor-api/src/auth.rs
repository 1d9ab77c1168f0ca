use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use axum_extra::extract::cookie::{Cookie, CookieJar, SameSite};
use tracing::error;
use uuid::Uuid;

use harbor_db::{Database, StoreError};
use harbor_gateway::registry::Registry;
use harbor_types::api::{
    AuthResponse, ErrorResponse, LoginRequest, ProfileResponse, RegisterRequest,
};
use harbor_types::token::{self, Claims};

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Arc<Database>,
    pub jwt_secret: String,
    pub registry: Registry,
}

pub const SESSION_COOKIE: &str = "token";

type ApiError = (StatusCode, Json<ErrorResponse>);

fn internal_error() -> ApiError {
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse {
            error: "internal error".to_string(),
        }),
    )
}

fn unauthorized() -> ApiError {
    (
        StatusCode::UNAUTHORIZED,
        Json(ErrorResponse {
            error: "invalid credentials".to_string(),
        }),
    )
}

/// Create an account and log the new user straight in.
pub async fn register(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    // Validate input
    if req.username.len() < 3 || req.username.len() > 32 {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "username must be 3-32 characters".to_string(),
            }),
        ));
    }
    if req.password.len() < 8 {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse {
                error: "password must be at least 8 characters".to_string(),
            }),
        ));
    }

    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    let password_hash = Argon2::default()
        .hash_password(req.password.as_bytes(), &salt)
        .map_err(|_| internal_error())?
        .to_string();

    let db = state.db.clone();
    let username = req.username.clone();
    let created = tokio::task::spawn_blocking(move || db.create_user(&username, &password_hash))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {e}");
            internal_error()
        })?;

    let user = match created {
        Ok(user) => user,
        Err(StoreError::DuplicateKey) => {
            return Err((
                StatusCode::CONFLICT,
                Json(ErrorResponse {
                    error: "username already taken".to_string(),
                }),
            ));
        }
        Err(e) => {
            error!("failed to create user: {e}");
            return Err(internal_error());
        }
    };

    let user_id: Uuid = user.id.parse().map_err(|_| internal_error())?;
    let token =
        token::issue(&state.jwt_secret, user_id, &user.username).map_err(|_| internal_error())?;

    Ok((
        StatusCode::CREATED,
        jar.add(session_cookie(token)),
        Json(AuthResponse { id: user_id }),
    ))
}

/// Verify credentials and set the session cookie. Unknown usernames and
/// wrong passwords both come back as 401, with no cookie issued.
pub async fn login(
    State(state): State<AppState>,
    jar: CookieJar,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.db.clone();
    let username = req.username.clone();
    let user = tokio::task::spawn_blocking(move || db.user_by_username(&username))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {e}");
            internal_error()
        })?
        .map_err(|e| {
            error!("user lookup failed: {e}");
            internal_error()
        })?
        .ok_or_else(unauthorized)?;

    let parsed_hash = PasswordHash::new(&user.password).map_err(|_| internal_error())?;
    Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .map_err(|_| unauthorized())?;

    let user_id: Uuid = user.id.parse().map_err(|_| internal_error())?;
    let token =
        token::issue(&state.jwt_secret, user_id, &user.username).map_err(|_| internal_error())?;

    Ok((
        StatusCode::CREATED,
        jar.add(session_cookie(token)),
        Json(AuthResponse { id: user_id }),
    ))
}

/// Echo the verified session claims back to the client.
pub async fn profile(Extension(claims): Extension<Claims>) -> Json<ProfileResponse> {
    Json(ProfileResponse {
        user_id: claims.sub,
        username: claims.username,
    })
}

fn session_cookie(token: String) -> Cookie<'static> {
    Cookie::build((SESSION_COOKIE, token))
        .path("/")
        .same_site(SameSite::None)
        .secure(true)
        .http_only(true)
        .build()
}
