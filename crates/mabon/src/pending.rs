//! Handles to pending and resolved values.

use std::marker::PhantomData;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;

use crate::error::{ResolveError, Result};

/// Progress of a resolution, fanned out to every handle clone.
///
/// The payload travels as JSON so that handles of different target types
/// can share one underlying execution.
#[derive(Debug, Clone)]
pub(crate) enum PendingState {
    Pending,
    Ready(Value),
    Failed(ResolveError),
}

/// Clonable handle to a value that may still be resolving.
///
/// All clones observe the same outcome. The value is decoded into `V`
/// when awaited; a decode failure surfaces as
/// [`ResolveError::Deserialize`] to the requesting caller only.
pub struct Pending<V> {
    rx: watch::Receiver<PendingState>,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Clone for Pending<V> {
    fn clone(&self) -> Self {
        Self {
            rx: self.rx.clone(),
            _marker: PhantomData,
        }
    }
}

impl<V> std::fmt::Debug for Pending<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = match &*self.rx.borrow() {
            PendingState::Pending => "pending",
            PendingState::Ready(_) => "ready",
            PendingState::Failed(_) => "failed",
        };
        f.debug_struct("Pending").field("state", &state).finish()
    }
}

impl<V: DeserializeOwned> Pending<V> {
    pub(crate) fn new(rx: watch::Receiver<PendingState>) -> Self {
        Self {
            rx,
            _marker: PhantomData,
        }
    }

    /// Wait for the resolution to finish and decode the value.
    ///
    /// Callers needing a timeout can race this against a deadline; doing
    /// so does not cancel the underlying execution.
    pub async fn wait(mut self) -> Result<V> {
        loop {
            {
                let state = self.rx.borrow_and_update();
                match &*state {
                    PendingState::Ready(value) => return decode(value),
                    PendingState::Failed(error) => return Err(error.clone()),
                    PendingState::Pending => {}
                }
            }
            if self.rx.changed().await.is_err() {
                return Err(ResolveError::Cancelled);
            }
        }
    }

    /// Non-blocking peek at the outcome, if there is one yet.
    pub fn try_get(&self) -> Option<Result<V>> {
        match &*self.rx.borrow() {
            PendingState::Pending => None,
            PendingState::Ready(value) => Some(decode(value)),
            PendingState::Failed(error) => Some(Err(error.clone())),
        }
    }

    /// Whether the resolution has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        !matches!(&*self.rx.borrow(), PendingState::Pending)
    }
}

/// The outcome of a resolve call: the pending value plus the live attempt
/// counter of the execution backing it.
pub struct Resolution<V> {
    pending: Pending<V>,
    attempt: watch::Receiver<u32>,
}

impl<V> Clone for Resolution<V> {
    fn clone(&self) -> Self {
        Self {
            pending: self.pending.clone(),
            attempt: self.attempt.clone(),
        }
    }
}

impl<V> std::fmt::Debug for Resolution<V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Resolution")
            .field("pending", &self.pending)
            .field("attempt", &*self.attempt.borrow())
            .finish()
    }
}

impl<V: DeserializeOwned> Resolution<V> {
    pub(crate) fn new(pending: Pending<V>, attempt: watch::Receiver<u32>) -> Self {
        Self { pending, attempt }
    }

    /// A clone of the pending value handle.
    pub fn pending(&self) -> Pending<V> {
        self.pending.clone()
    }

    /// Wait for the outcome and decode it.
    pub async fn wait(self) -> Result<V> {
        self.pending.wait().await
    }

    /// Non-blocking peek at the outcome, if there is one yet.
    pub fn try_get(&self) -> Option<Result<V>> {
        self.pending.try_get()
    }

    /// The most recently started attempt, counted from zero. Stays at zero
    /// for cache hits.
    pub fn attempt(&self) -> u32 {
        *self.attempt.borrow()
    }

    /// Watch attempt numbers as they are published.
    pub fn watch_attempt(&self) -> watch::Receiver<u32> {
        self.attempt.clone()
    }

    /// Whether the resolution has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.pending.is_finished()
    }
}

fn decode<V: DeserializeOwned>(value: &Value) -> Result<V> {
    serde_json::from_value(value.clone()).map_err(|e| ResolveError::Deserialize(e.to_string()))
}
