use crate::Database;
use crate::error::StoreError;
use crate::models::{MessageRow, NewMessage, UserRow};
use chrono::{SecondsFormat, Utc};
use rusqlite::{Connection, OptionalExtension};
use uuid::Uuid;

fn now_rfc3339() -> String {
    Utc::now().to_rfc3339_opts(SecondsFormat::Micros, true)
}

impl Database {
    // -- Users --

    /// Insert a new user. A taken username surfaces as `DuplicateKey` and
    /// leaves no record behind.
    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<UserRow, StoreError> {
        let row = UserRow {
            id: Uuid::new_v4().to_string(),
            username: username.to_string(),
            password: password_hash.to_string(),
            created_at: now_rfc3339(),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO users (id, username, password, created_at) VALUES (?1, ?2, ?3, ?4)",
                (&row.id, &row.username, &row.password, &row.created_at),
            )?;
            Ok(())
        })?;

        Ok(row)
    }

    pub fn user_by_username(&self, username: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| query_user(conn, "username", username))
    }

    pub fn user_by_id(&self, id: &str) -> Result<Option<UserRow>, StoreError> {
        self.with_conn(|conn| query_user(conn, "id", id))
    }

    pub fn list_users(&self) -> Result<Vec<UserRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, username, password, created_at FROM users ORDER BY created_at ASC",
            )?;
            let rows = stmt
                .query_map([], user_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    // -- Messages --

    /// Append a message, assigning its id and creation timestamp.
    pub fn append_message(&self, new: NewMessage) -> Result<MessageRow, StoreError> {
        let row = MessageRow {
            id: Uuid::new_v4().to_string(),
            sender_id: new.sender_id,
            sender_username: new.sender_username,
            receiver_id: new.receiver_id,
            receiver_username: new.receiver_username,
            kind: new.kind,
            message: new.message,
            mime_type: new.mime_type,
            created_at: now_rfc3339(),
        };

        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO messages
                    (id, sender_id, sender_username, receiver_id, receiver_username,
                     kind, message, mime_type, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
                rusqlite::params![
                    row.id,
                    row.sender_id,
                    row.sender_username,
                    row.receiver_id,
                    row.receiver_username,
                    row.kind,
                    row.message,
                    row.mime_type,
                    row.created_at,
                ],
            )?;
            Ok(())
        })?;

        Ok(row)
    }

    /// Every message strictly between the two named users, in either
    /// direction, oldest first. Messages involving any third party never
    /// match, even when one of the two names appears on them.
    pub fn conversation(&self, user_a: &str, user_b: &str) -> Result<Vec<MessageRow>, StoreError> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, sender_id, sender_username, receiver_id, receiver_username,
                        kind, message, mime_type, created_at
                 FROM messages
                 WHERE (sender_username = ?1 AND receiver_username = ?2)
                    OR (sender_username = ?2 AND receiver_username = ?1)
                 ORDER BY created_at ASC, rowid ASC",
            )?;
            let rows = stmt
                .query_map([user_a, user_b], message_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }
}

fn query_user(conn: &Connection, column: &str, value: &str) -> Result<Option<UserRow>, StoreError> {
    // `column` is a compile-time constant at every call site, never user input.
    let sql = format!("SELECT id, username, password, created_at FROM users WHERE {column} = ?1");
    let mut stmt = conn.prepare(&sql)?;
    let row = stmt.query_row([value], user_from_row).optional()?;
    Ok(row)
}

fn user_from_row(row: &rusqlite::Row<'_>) -> Result<UserRow, rusqlite::Error> {
    Ok(UserRow {
        id: row.get(0)?,
        username: row.get(1)?,
        password: row.get(2)?,
        created_at: row.get(3)?,
    })
}

fn message_from_row(row: &rusqlite::Row<'_>) -> Result<MessageRow, rusqlite::Error> {
    Ok(MessageRow {
        id: row.get(0)?,
        sender_id: row.get(1)?,
        sender_username: row.get(2)?,
        receiver_id: row.get(3)?,
        receiver_username: row.get(4)?,
        kind: row.get(5)?,
        message: row.get(6)?,
        mime_type: row.get(7)?,
        created_at: row.get(8)?,
    })
}
