use serde::{Deserialize, Serialize};
use uuid::Uuid;

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct RegisterRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

/// Returned by both /register and /login alongside the session cookie.
#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ErrorResponse {
    pub error: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProfileResponse {
    pub user_id: Uuid,
    pub username: String,
}

// -- Listings --

/// One user record in the /allUsers listing. Deliberately excludes the
/// password hash.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: Uuid,
    pub username: String,
    pub created_at: String,
}

/// One live session in the /allClients listing.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    pub username: String,
    pub connection_id: Uuid,
    pub user_id: Uuid,
}

// -- Conversation history --

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MessageRecord {
    pub id: Uuid,
    #[serde(rename = "senderID")]
    pub sender_id: Option<Uuid>,
    pub sender_username: String,
    #[serde(rename = "receiverID")]
    pub receiver_id: Option<Uuid>,
    pub receiver_username: Option<String>,
    #[serde(rename = "type")]
    pub kind: String,
    pub message: String,
    pub mime_type: Option<String>,
    pub created_at: chrono::DateTime<chrono::Utc>,
}
