use thiserror::Error;

/// Errors that can occur when interacting with storage.
#[derive(Debug, Error)]
pub enum StorageError {
    /// A uniqueness constraint rejected a write.
    #[error("Unique constraint violated: {constraint}")]
    UniqueViolation { constraint: String },

    /// An update targeted a row that does not exist.
    #[error("Row not found: {table} with id {id}")]
    RowNotFound { table: &'static str, id: i64 },

    /// A stored value could not be mapped onto the domain type.
    #[error("Invalid value {value:?} in column {column}")]
    InvalidColumn { column: &'static str, value: String },

    /// A database error occurred.
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// A database migration error occurred.
    #[error("Migration error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// A serialization/deserialization error occurred.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl StorageError {
    /// Returns true if this is a violation of the named constraint.
    pub fn is_unique_violation(&self, name: &str) -> bool {
        matches!(self, StorageError::UniqueViolation { constraint } if constraint == name)
    }
}

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
