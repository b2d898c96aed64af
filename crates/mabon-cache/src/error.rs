//! Error types for cache operations.

use thiserror::Error;

/// Errors that can occur in the cache crate.
///
/// These never reach resolution callers; the store logs them and degrades
/// to memory-only behavior for the failing operation.
#[derive(Debug, Error)]
pub enum CacheError {
    /// Database connection or operation failed.
    #[error("Database error: {0}")]
    Database(#[from] rusqlite::Error),

    /// Serialization/deserialization failed.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Error reported by a storage backend.
    #[error("Backend error: {0}")]
    Backend(String),
}

/// Result type alias for cache operations.
pub type Result<T> = std::result::Result<T, CacheError>;
