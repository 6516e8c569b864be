/// Errors that can occur within the storage layer.
///
/// Evidence-absent conditions (no samples yet, unknown dedup key) are
/// expressed as `Option`/empty results by the stores themselves and never
/// reach this type; these variants all mean the store itself misbehaved.
///
/// # Examples
///
/// ```rust
/// use pipemon_storage::error::StorageError;
///
/// let err = StorageError::PartitionNotFound("2026-01-16".to_string());
/// assert!(err.to_string().contains("2026-01-16"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    /// An underlying SQLite error.
    #[error("Storage: SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Filesystem error while managing partition files.
    #[error("Storage: I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A partition key was requested that is not loaded and not on disk.
    #[error("Storage: partition {0} not found")]
    PartitionNotFound(String),

    /// A persisted column held a value the row mapper cannot interpret.
    #[error("Storage: invalid {column} value '{value}'")]
    InvalidColumn { column: &'static str, value: String },
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
