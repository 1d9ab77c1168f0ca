use crate::error::StoreError;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<(), StoreError> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS users (
            id          TEXT PRIMARY KEY,
            username    TEXT NOT NULL UNIQUE,
            password    TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE TABLE IF NOT EXISTS messages (
            id                  TEXT PRIMARY KEY,
            sender_id           TEXT,
            sender_username     TEXT NOT NULL,
            receiver_id         TEXT,
            receiver_username   TEXT,
            kind                TEXT NOT NULL,
            message             TEXT NOT NULL,
            mime_type           TEXT,
            created_at          TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_pair
            ON messages(sender_username, receiver_username, created_at);
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
