/// Database row types — these map directly to SQLite rows.
/// Distinct from the harbor-types API models to keep the DB layer
/// independent.

#[derive(Debug)]
pub struct UserRow {
    pub id: String,
    pub username: String,
    pub password: String,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub sender_id: Option<String>,
    pub sender_username: String,
    pub receiver_id: Option<String>,
    pub receiver_username: Option<String>,
    pub kind: String,
    pub message: String,
    pub mime_type: Option<String>,
    pub created_at: String,
}

/// Fields of a message before the store assigns an id and timestamp.
pub struct NewMessage {
    pub sender_id: Option<String>,
    pub sender_username: String,
    pub receiver_id: Option<String>,
    pub receiver_username: Option<String>,
    pub kind: String,
    pub message: String,
    pub mime_type: Option<String>,
}
