use thiserror::Error;

/// Failures surfaced by the record stores.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("record not found")]
    NotFound,
    #[error("a record with that key already exists")]
    DuplicateKey,
    #[error("storage failure: {0}")]
    Sqlite(rusqlite::Error),
    #[error("database lock poisoned")]
    Poisoned,
}

impl From<rusqlite::Error> for StoreError {
    fn from(e: rusqlite::Error) -> Self {
        if let rusqlite::Error::SqliteFailure(err, _) = &e {
            if err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_UNIQUE
                || err.extended_code == rusqlite::ffi::SQLITE_CONSTRAINT_PRIMARYKEY
            {
                return StoreError::DuplicateKey;
            }
        }
        StoreError::Sqlite(e)
    }
}
