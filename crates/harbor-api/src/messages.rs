use axum::{
    Extension, Json,
    extract::{Path, State},
    http::StatusCode,
    response::IntoResponse,
};
use tracing::{error, warn};
use uuid::Uuid;

use harbor_db::models::MessageRow;
use harbor_types::api::MessageRecord;
use harbor_types::token::Claims;

use crate::auth::AppState;

/// Conversation history between the caller and `other`, oldest first.
/// Matching is strictly pairwise: messages either of the two exchanged
/// with a third party never appear.
pub async fn get_conversation(
    State(state): State<AppState>,
    Path(other): Path<String>,
    Extension(claims): Extension<Claims>,
) -> Result<impl IntoResponse, StatusCode> {
    let db = state.db.clone();
    let me = claims.username.clone();

    // Run the blocking DB query off the async runtime
    let rows = tokio::task::spawn_blocking(move || db.conversation(&me, &other))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?
        .map_err(|e| {
            error!("conversation query failed: {e}");
            StatusCode::INTERNAL_SERVER_ERROR
        })?;

    let messages: Vec<MessageRecord> = rows.into_iter().map(record_from_row).collect();
    Ok(Json(messages))
}

fn record_from_row(row: MessageRow) -> MessageRecord {
    MessageRecord {
        id: row.id.parse().unwrap_or_else(|e| {
            warn!("Corrupt message id '{}': {}", row.id, e);
            Uuid::default()
        }),
        sender_id: row.sender_id.as_deref().and_then(|id| {
            id.parse()
                .map_err(|e| warn!("Corrupt sender_id '{}' on message '{}': {}", id, row.id, e))
                .ok()
        }),
        sender_username: row.sender_username,
        receiver_id: row.receiver_id.as_deref().and_then(|id| {
            id.parse()
                .map_err(|e| warn!("Corrupt receiver_id '{}' on message '{}': {}", id, row.id, e))
                .ok()
        }),
        receiver_username: row.receiver_username,
        kind: row.kind,
        message: row.message,
        mime_type: row.mime_type,
        created_at: row
            .created_at
            .parse::<chrono::DateTime<chrono::Utc>>()
            .unwrap_or_else(|e| {
                warn!(
                    "Corrupt created_at '{}' on message '{}': {}",
                    row.created_at, row.id, e
                );
                chrono::DateTime::default()
            }),
    }
}
