use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use tracing::{error, warn};
use uuid::Uuid;

use harbor_types::api::{ClientInfo, UserSummary};

use crate::auth::AppState;

/// Every registered account. Password hashes stay out of the response.
pub async fn all_users(State(state): State<AppState>) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let rows = tokio::task::spawn_blocking(move || db.list_users())
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("user listing failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let users: Vec<UserSummary> = rows
        .into_iter()
        .map(|row| UserSummary {
            id: row.id.parse().unwrap_or_else(|e| {
                warn!("Corrupt user id '{}': {}", row.id, e);
                Uuid::default()
            }),
            username: row.username,
            created_at: row.created_at,
        })
        .collect();

    Ok(Json(users))
}

/// Current presence snapshot: one entry per authenticated live connection.
pub async fn all_clients(State(state): State<AppState>) -> Json<Vec<ClientInfo>> {
    let clients = state
        .registry
        .snapshot()
        .await
        .into_iter()
        .map(|session| ClientInfo {
            username: session.username,
            connection_id: session.conn_id,
            user_id: session.user_id,
        })
        .collect();

    Json(clients)
}
