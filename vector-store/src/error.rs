//! Error types for the vector store.

use thiserror::Error;

/// Result type alias for store operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur while talking to the vector store.
#[derive(Error, Debug)]
pub enum StoreError {
    /// Database error.
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Store has not been initialized.
    #[error("vector store not connected")]
    NotConnected,

    /// Statement failed (used by non-SQL backends and test doubles).
    #[error("query failed: {0}")]
    Query(String),

    /// The similarity index could not be built.
    #[error("index creation failed: {0}")]
    Index(String),

        /// Caller passed something the store cannot accept.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Serialization error.
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}
