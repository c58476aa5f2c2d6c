use thiserror::Error;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Migration error: {0}")]
    Migration(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialisation error: {0}")]
    Serialisation(#[from] serde_json::Error),

    /// Blob path that is empty, absolute or escapes the store root.
    #[error("Invalid blob path: {0}")]
    InvalidPath(String),

    /// A stored row that no longer maps onto a message record.
    #[error("Corrupt record {id}: {reason}")]
    Corrupt { id: String, reason: String },

    #[error("Duplicate message id: {0}")]
    Duplicate(String),
}
