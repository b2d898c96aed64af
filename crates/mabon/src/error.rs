//! Error types for resolution outcomes.

use std::sync::Arc;

use thiserror::Error;

/// Error type for resolution outcomes.
///
/// Cloneable so that every handle sharing a resolution observes the same
/// failure. Cache-layer errors never appear here; they are logged and
/// absorbed inside the store.
#[derive(Debug, Clone, Error)]
pub enum ResolveError {
    /// The supplier failed on every allowed attempt.
    #[error("Supplier failed after {attempts} attempts: {error}")]
    Supplier {
        /// Total number of attempts made.
        attempts: u32,
        /// The error from the final attempt.
        error: Arc<anyhow::Error>,
    },

    /// The resolution was cancelled.
    #[error("Resolution cancelled")]
    Cancelled,

    /// The value could not cross the resolution boundary: a cached or
    /// produced value did not decode into the requested type, or the
    /// supplier's result was not JSON-representable.
    #[error("Failed to decode resolved value: {0}")]
    Deserialize(String),
}

/// Result type alias for resolution outcomes.
pub type Result<T> = std::result::Result<T, ResolveError>;
