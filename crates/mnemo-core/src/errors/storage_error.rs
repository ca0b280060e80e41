/// Storage-layer errors for SQLite operations.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("SQLite error: {message}")]
    Sqlite { message: String },

    #[error("migration failed at version {version}: {reason}")]
    MigrationFailed { version: u32, reason: String },

    #[error("vector blob has {actual} bytes, expected {expected} (4 x dimension)")]
    VectorLength { expected: usize, actual: usize },

    #[error("sqlite-vec extension is not loaded")]
    VecUnavailable,
}
