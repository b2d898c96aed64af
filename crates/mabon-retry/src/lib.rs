//! Retry orchestration with configurable backoff.
//!
//! Runs a fallible async operation up to a configured number of times,
//! waiting out a backoff schedule between attempts. Runs are spawned onto
//! the runtime and observed through a [`RetryHandle`]: callers can await
//! the final outcome, watch live attempt numbers and states, or cancel
//! the run at any point.
//!
//! # Example
//!
//! ```rust,ignore
//! use std::time::Duration;
//! use mabon_retry::{Backoff, RetryPolicy};
//!
//! let policy = RetryPolicy::new()
//!     .with_count(3)
//!     .with_delay(Duration::from_millis(250))
//!     .with_backoff(Backoff::Exponential);
//!
//! let value = mabon_retry::execute(policy, || async { fetch().await }).await?;
//! ```

mod error;
mod policy;
mod runner;

pub use error::{Result, RetryError};
pub use policy::{Backoff, BackoffFn, RetryPolicy};
pub use runner::{RetryHandle, RetryState, execute, spawn};
