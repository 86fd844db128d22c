//! Fixed-delay retry for connect attempts.
//!
//! The broker link is retried with a bounded number of attempts and a fixed
//! sleep between them. A fixed delay (rather than exponential backoff) keeps
//! worst-case connect latency predictable, which matters because a publish
//! call holds its caller for the whole connect phase.
//!
//! # Example
//!
//! ```rust
//! use eventbuss_runtime::retry::{RetryPolicy, retry_with_policy};
//! use std::time::Duration;
//!
//! # async fn example() -> Result<(), String> {
//! let policy = RetryPolicy::new(5, Duration::from_secs(2));
//!
//! let value = retry_with_policy(&policy, || async {
//!     Ok::<_, String>(42)
//! }).await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use std::time::Duration;
use tokio::time::sleep;

/// Bounded fixed-delay retry policy.
///
/// Defaults match the gateway's connection configuration: 5 attempts,
/// 2 seconds apart.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total number of attempts, including the first. Never zero.
    pub attempts: usize,
    /// Fixed sleep between consecutive attempts.
    pub sleep: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            attempts: 5,
            sleep: Duration::from_secs(2),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with `attempts` total tries, `sleep` apart.
    ///
    /// An `attempts` of zero is treated as one: the operation always runs
    /// at least once.
    #[must_use]
    pub const fn new(attempts: usize, sleep: Duration) -> Self {
        Self { attempts, sleep }
    }

    /// A policy that tries `attempts` times back to back, for tests and
    /// health probes.
    #[must_use]
    pub const fn immediate(attempts: usize) -> Self {
        Self::new(attempts, Duration::ZERO)
    }

    fn effective_attempts(&self) -> usize {
        self.attempts.max(1)
    }
}

/// Run `operation` until it succeeds or the policy's attempts are exhausted.
///
/// Returns the first success, or the error of the final attempt.
///
/// # Errors
///
/// Returns `E` from the last attempt once every attempt has failed.
pub async fn retry_with_policy<F, Fut, T, E>(policy: &RetryPolicy, mut operation: F) -> Result<T, E>
where
    F: FnMut() -> Fut,
    Fut: std::future::Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let attempts = policy.effective_attempts();

    for attempt in 1..=attempts {
        match operation().await {
            Ok(value) => {
                if attempt > 1 {
                    tracing::info!(attempt, "operation succeeded after retry");
                }
                return Ok(value);
            }
            Err(err) if attempt == attempts => {
                tracing::error!(attempt, error = %err, "operation failed, attempts exhausted");
                return Err(err);
            }
            Err(err) => {
                tracing::warn!(
                    attempt,
                    sleep_ms = policy.sleep.as_millis(),
                    error = %err,
                    "operation failed, retrying"
                );
                sleep(policy.sleep).await;
            }
        }
    }

    // The loop always returns on the final attempt.
    unreachable!("retry loop exited without a result")
}
