//! Conflict retry with exponential backoff and jitter.
//!
//! [`retry_on_conflict`] retries only optimistic-concurrency conflicts. It is
//! meant to wrap a whole read-modify-write sequence so that every attempt
//! starts from a fresh read of the object.
//!
//! # Example
//!
//! ```ignore
//! use tortoise_common::retry::{retry_on_conflict, RetryConfig};
//!
//! retry_on_conflict(&RetryConfig::conflict(), "disable updater VPA", || async {
//!     let mut vpa = client.get(ns, name).await?;
//!     vpa.status = None;
//!     client.update(&vpa).await
//! })
//! .await?;
//! ```

use std::time::Duration;

use rand::Rng;
use tracing::{error, warn};

use crate::metrics;

/// Budget for re-running an operation after a conflict.
#[derive(Clone, Debug)]
pub struct RetryConfig {
    /// Maximum number of attempts, including the first (0 is treated as 1)
    pub max_attempts: u32,
    /// Initial delay between retries
    pub initial_delay: Duration,
    /// Maximum delay between retries
    pub max_delay: Duration,
    /// Multiplier for exponential backoff
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Small, bounded budget for resolving write conflicts.
    ///
    /// Five attempts starting at 10ms and doubling up to 200ms.
    pub fn conflict() -> Self {
        Self {
            max_attempts: 5,
            initial_delay: Duration::from_millis(10),
            max_delay: Duration::from_millis(200),
            backoff_multiplier: 2.0,
        }
    }

    /// Attempts actually allowed; the budget is never unbounded
    pub fn attempts(&self) -> u32 {
        self.max_attempts.max(1)
    }
}

/// Errors that can report an optimistic-concurrency conflict.
pub trait IsConflict {
    /// True when the failure was a resourceVersion mismatch on write
    fn is_conflict(&self) -> bool;
}

impl IsConflict for crate::Error {
    fn is_conflict(&self) -> bool {
        crate::Error::is_conflict(self)
    }
}

impl IsConflict for kube::Error {
    fn is_conflict(&self) -> bool {
        matches!(self, kube::Error::Api(ae) if ae.code == 409)
    }
}

/// Re-run a read-modify-write sequence while it fails with a version conflict.
///
/// `operation` must re-read the object on every call and reapply its
/// mutation from scratch. Any error that is not a conflict is returned as-is;
/// a conflict that outlives the budget is returned as the last error.
pub async fn retry_on_conflict<F, Fut, T, E>(
    config: &RetryConfig,
    operation_name: &str,
    mut operation: F,
) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display + IsConflict,
{
    let max_attempts = config.attempts();
    let mut attempt = 0u32;
    let mut delay = config.initial_delay;

    loop {
        attempt += 1;

        match operation().await {
            Ok(result) => return Ok(result),
            Err(e) if !e.is_conflict() => return Err(e),
            Err(e) => {
                if attempt >= max_attempts {
                    error!(
                        operation = %operation_name,
                        attempt = attempt,
                        error = %e,
                        "Conflict persisted after max retries"
                    );
                    return Err(e);
                }

                metrics::record_conflict_retry(operation_name);

                // Add jitter: 0.5x to 1.5x of the delay
                let jitter = rand::thread_rng().gen_range(0.5..1.5);
                let jittered_delay = Duration::from_secs_f64(delay.as_secs_f64() * jitter);

                warn!(
                    operation = %operation_name,
                    attempt = attempt,
                    error = %e,
                    delay_ms = jittered_delay.as_millis(),
                    "Write conflicted, refetching and retrying"
                );

                tokio::time::sleep(jittered_delay).await;

                // Exponential backoff, capped at max_delay
                delay = Duration::from_secs_f64(
                    (delay.as_secs_f64() * config.backoff_multiplier)
                        .min(config.max_delay.as_secs_f64()),
                );
            }
        }
    }
}
