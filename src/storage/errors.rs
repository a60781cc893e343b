//! Storage collaborator errors

use thiserror::Error;

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Failures reported by the physical store. None of these are silent no-ops.
#[derive(Debug, Error)]
pub enum StorageError {
    /// Statement rejected by SQLite (duplicate column, reserved word, ...)
    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Database file could not be created, moved or removed
    #[error("io: {0}")]
    Io(#[from] std::io::Error),

    #[error("database '{0}' already exists")]
    DatabaseExists(String),

    #[error("database '{0}' not found")]
    DatabaseNotFound(String),

    #[error("table '{0}' not found")]
    TableNotFound(String),
}
