//! Per-resource sessions tracking in-flight executions.

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;

use crate::options::CacheParams;
use crate::pending::PendingState;

/// A tracked execution for one resource identity.
pub(crate) struct Execution {
    /// Fan-out handle cloned to deduplicated joiners.
    pub state_rx: watch::Receiver<PendingState>,

    /// Live attempt counter of the underlying retry run.
    pub attempt_rx: watch::Receiver<u32>,

    /// Cancels the underlying run.
    pub token: CancellationToken,

    /// Distinguishes this execution from later ones for the same key, so a
    /// finished run only untracks itself.
    pub epoch: u64,

    /// Set by `cancel`. A cancelled execution stays tracked as a terminal
    /// marker until teardown or an identity change.
    pub cancelled: bool,
}

/// Session state for one resource id.
pub(crate) struct ResourceSession {
    /// Hash of the resource id and every option affecting execution.
    pub identity: u64,

    /// Cache parameters from the most recent resolve, kept to detect
    /// TTL/persistence changes that call for a rewrite.
    pub cache_params: CacheParams,

    /// The in-flight (or cancelled) execution, if any.
    pub execution: Option<Execution>,
}

impl ResourceSession {
    pub fn new(identity: u64, cache_params: CacheParams) -> Self {
        Self {
            identity,
            cache_params,
            execution: None,
        }
    }
}
