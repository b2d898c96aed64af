//! Retry execution: spawned attempt loops observed through handles.

use std::future::Future;
use std::time::Duration;

use tokio::sync::{oneshot, watch};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::error::{Result, RetryError};
use crate::policy::RetryPolicy;

/// Observable state of a retry run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RetryState {
    /// No attempt has started yet.
    Idle,

    /// An attempt is in flight.
    Attempting { attempt: u32 },

    /// Waiting out the backoff delay before the next attempt.
    Waiting { next_attempt: u32, delay: Duration },

    /// An attempt succeeded.
    Succeeded { attempt: u32 },

    /// Every allowed attempt failed.
    Failed { attempt: u32 },

    /// The run was cancelled; `attempt` is the last attempt that ran.
    Cancelled { attempt: u32 },
}

impl RetryState {
    /// The attempt index the state refers to, if any.
    pub fn attempt(&self) -> Option<u32> {
        match self {
            RetryState::Idle => None,
            RetryState::Waiting { next_attempt, .. } => Some(*next_attempt),
            RetryState::Attempting { attempt }
            | RetryState::Succeeded { attempt }
            | RetryState::Failed { attempt }
            | RetryState::Cancelled { attempt } => Some(*attempt),
        }
    }

    /// Whether the run has finished.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            RetryState::Succeeded { .. } | RetryState::Failed { .. } | RetryState::Cancelled { .. }
        )
    }
}

/// Handle to a spawned retry run.
///
/// The run proceeds on its own; the handle observes and controls it.
/// Dropping the handle detaches the run without cancelling it.
pub struct RetryHandle<T> {
    result: oneshot::Receiver<Result<T>>,
    state: watch::Receiver<RetryState>,
    attempt: watch::Receiver<u32>,
    token: CancellationToken,
    #[allow(dead_code)]
    task: tokio::task::JoinHandle<()>,
}

impl<T> std::fmt::Debug for RetryHandle<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RetryHandle")
            .field("state", &*self.state.borrow())
            .finish_non_exhaustive()
    }
}

impl<T> RetryHandle<T> {
    /// Wait for the run to finish and return its outcome.
    pub async fn join(self) -> Result<T> {
        self.result.await.unwrap_or(Err(RetryError::Cancelled))
    }

    /// Cancel the run.
    ///
    /// Interrupts an in-flight attempt or backoff wait. Cancelling a
    /// finished run has no effect.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    /// Token that cancels this run when triggered.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// The most recently started attempt, counted from zero.
    pub fn attempt(&self) -> u32 {
        *self.attempt.borrow()
    }

    /// Watch attempt numbers as they are published.
    pub fn watch_attempt(&self) -> watch::Receiver<u32> {
        self.attempt.clone()
    }

    /// The current state of the run.
    pub fn state(&self) -> RetryState {
        self.state.borrow().clone()
    }

    /// Watch state transitions as they happen.
    pub fn watch_state(&self) -> watch::Receiver<RetryState> {
        self.state.clone()
    }

    /// Whether the run has reached a terminal state.
    pub fn is_finished(&self) -> bool {
        self.state.borrow().is_terminal()
    }
}

/// Spawn a retry run for an operation.
///
/// The operation is invoked once per attempt. Each attempt's number is
/// published on the handle's attempt channel before the operation runs.
pub fn spawn<T, F, Fut>(policy: RetryPolicy, operation: F) -> RetryHandle<T>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    let (result_tx, result_rx) = oneshot::channel();
    let (state_tx, state_rx) = watch::channel(RetryState::Idle);
    let (attempt_tx, attempt_rx) = watch::channel(0u32);
    let token = CancellationToken::new();
    let task_token = token.clone();

    let task = tokio::spawn(async move {
        let mut attempt: u32 = 0;

        loop {
            let _ = attempt_tx.send(attempt);
            let _ = state_tx.send(RetryState::Attempting { attempt });

            let outcome = tokio::select! {
                outcome = operation() => outcome,
                _ = task_token.cancelled() => {
                    debug!(attempt, "Retry run cancelled mid-attempt");
                    let _ = state_tx.send(RetryState::Cancelled { attempt });
                    let _ = result_tx.send(Err(RetryError::Cancelled));
                    return;
                }
            };

            match outcome {
                Ok(value) => {
                    let _ = state_tx.send(RetryState::Succeeded { attempt });
                    let _ = result_tx.send(Ok(value));
                    return;
                }
                Err(error) => {
                    if attempt >= policy.count {
                        warn!(attempt, error = %error, "All retry attempts exhausted");
                        let _ = state_tx.send(RetryState::Failed { attempt });
                        let _ = result_tx.send(Err(RetryError::Exhausted {
                            attempts: attempt + 1,
                            error,
                        }));
                        return;
                    }

                    let delay = policy.delay_after(attempt);
                    warn!(attempt, delay = ?delay, error = %error, "Attempt failed, retrying");

                    if delay.is_zero() {
                        if task_token.is_cancelled() {
                            let _ = state_tx.send(RetryState::Cancelled { attempt });
                            let _ = result_tx.send(Err(RetryError::Cancelled));
                            return;
                        }
                    } else {
                        let _ = state_tx.send(RetryState::Waiting {
                            next_attempt: attempt + 1,
                            delay,
                        });
                        tokio::select! {
                            _ = tokio::time::sleep(delay) => {}
                            _ = task_token.cancelled() => {
                                debug!(attempt, "Retry run cancelled during backoff");
                                let _ = state_tx.send(RetryState::Cancelled { attempt });
                                let _ = result_tx.send(Err(RetryError::Cancelled));
                                return;
                            }
                        }
                    }

                    attempt += 1;
                }
            }
        }
    });

    RetryHandle {
        result: result_rx,
        state: state_rx,
        attempt: attempt_rx,
        token,
        task,
    }
}

/// Spawn a retry run and wait for its outcome.
pub async fn execute<T, F, Fut>(policy: RetryPolicy, operation: F) -> Result<T>
where
    T: Send + 'static,
    F: Fn() -> Fut + Send + 'static,
    Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
{
    spawn(policy, operation).join().await
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicU32, Ordering};
    use std::time::Instant;
    use tokio::time::sleep;

    use crate::policy::Backoff;

    fn counting(
        failures: u32,
        calls: Arc<AtomicU32>,
    ) -> impl Fn() -> std::pin::Pin<Box<dyn Future<Output = anyhow::Result<u32>> + Send>> {
        move || {
            let calls = calls.clone();
            Box::pin(async move {
                let call = calls.fetch_add(1, Ordering::SeqCst);
                if call < failures {
                    Err(anyhow::anyhow!("transient failure {call}"))
                } else {
                    Ok(call)
                }
            })
        }
    }

    #[tokio::test]
    async fn test_first_attempt_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let result = execute(RetryPolicy::new(), counting(0, calls.clone())).await;

        assert_eq!(result.unwrap(), 0);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_retries_until_success() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new()
            .with_count(2)
            .with_delay(Duration::from_millis(5));

        let handle = spawn(policy, counting(2, calls.clone()));
        let state_rx = handle.watch_state();

        assert_eq!(handle.join().await.unwrap(), 2);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
        assert_eq!(*state_rx.borrow(), RetryState::Succeeded { attempt: 2 });
    }

    #[tokio::test]
    async fn test_exhausted_reports_attempt_total() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new()
            .with_count(1)
            .with_delay(Duration::from_millis(5));

        let result = execute(policy, counting(10, calls.clone())).await;

        match result {
            Err(RetryError::Exhausted { attempts, error }) => {
                assert_eq!(attempts, 2);
                assert!(error.to_string().contains("transient failure 1"));
            }
            other => panic!("expected Exhausted, got {other:?}"),
        }
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_attempt_channel_reaches_final_attempt() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new()
            .with_count(2)
            .with_delay(Duration::from_millis(5));

        let handle = spawn(policy, counting(2, calls.clone()));
        let attempt_rx = handle.watch_attempt();

        handle.join().await.unwrap();
        assert_eq!(*attempt_rx.borrow(), 2);
    }

    #[tokio::test]
    async fn test_exponential_delays_accumulate() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new()
            .with_count(2)
            .with_delay(Duration::from_millis(50))
            .with_backoff(Backoff::Exponential);

        // Two failures wait 50ms then 100ms before the third call succeeds.
        let start = Instant::now();
        execute(policy, counting(2, calls.clone())).await.unwrap();

        assert!(start.elapsed() >= Duration::from_millis(150));
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new()
            .with_count(5)
            .with_delay(Duration::from_millis(500));

        let handle = spawn(policy, counting(10, calls.clone()));
        sleep(Duration::from_millis(50)).await;
        handle.cancel();

        match handle.join().await {
            Err(RetryError::Cancelled) => {}
            other => panic!("expected Cancelled, got {other:?}"),
        }

        // Only the first attempt ran; the backoff wait was interrupted.
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_cancel_interrupts_running_attempt() {
        let handle = spawn(RetryPolicy::new(), || async {
            sleep(Duration::from_secs(60)).await;
            Ok(())
        });

        assert!(!handle.is_finished());

        let start = Instant::now();
        handle.cancel();
        match handle.join().await {
            Err(RetryError::Cancelled) => {}
            other => panic!("expected Cancelled, got {other:?}"),
        }

        assert!(start.elapsed() < Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_zero_delay_retries_immediately() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new().with_count(3);

        let start = Instant::now();
        let result = execute(policy, counting(3, calls.clone())).await;

        assert_eq!(result.unwrap(), 3);
        assert_eq!(calls.load(Ordering::SeqCst), 4);
        assert!(start.elapsed() < Duration::from_secs(1));
    }

    #[tokio::test]
    async fn test_state_transitions_to_waiting() {
        let calls = Arc::new(AtomicU32::new(0));
        let policy = RetryPolicy::new()
            .with_count(1)
            .with_delay(Duration::from_millis(500));

        let handle = spawn(policy, counting(10, calls.clone()));
        sleep(Duration::from_millis(50)).await;

        assert_eq!(
            handle.state(),
            RetryState::Waiting {
                next_attempt: 1,
                delay: Duration::from_millis(500),
            }
        );
        assert!(!handle.is_finished());
        handle.cancel();
    }
}
