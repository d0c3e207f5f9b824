//! Store error types.

use scrapo_core::DatasetShape;
use thiserror::Error;

/// Persistence and accumulation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Failed to open or create the database.
    #[error("failed to open database: {0}")]
    Open(String),

    /// Migration execution failed.
    #[error("migration failed: {0}")]
    Migration(String),

    /// Serialization/deserialization of a stored value failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// A merge targeted a handle holding a different dataset shape.
    #[error("dataset '{key}' holds {expected:?}, not {actual:?}")]
    ShapeMismatch {
        /// Storage key
        key: String,
        /// Shape the handle declares
        expected: DatasetShape,
        /// Shape the caller tried to merge
        actual: DatasetShape,
    },

    /// A row-shaped batch's header differs from the established header.
    #[error("header of new batch for '{key}' does not match the stored header")]
    SchemaDrift {
        /// Storage key
        key: String,
        /// Header already stored
        expected: Vec<String>,
        /// Header of the rejected batch
        found: Vec<String>,
    },

    /// Underlying `SQLx` error.
    #[error("database error: {0}")]
    Sqlx(#[from] sqlx::Error),
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        Self::Serialization(e.to_string())
    }
}

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;
