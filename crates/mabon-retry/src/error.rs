//! Error types for retry runs.

use thiserror::Error;

/// Error type for retry runs.
#[derive(Debug, Error)]
pub enum RetryError {
    /// Every allowed attempt failed; carries the last attempt's error.
    #[error("All {attempts} attempts failed: {error}")]
    Exhausted {
        /// Total number of attempts made.
        attempts: u32,
        /// The error returned by the final attempt.
        error: anyhow::Error,
    },

    /// The run was cancelled before any attempt succeeded.
    #[error("Retry run cancelled")]
    Cancelled,
}

/// Result type alias for retry runs.
pub type Result<T> = std::result::Result<T, RetryError>;
