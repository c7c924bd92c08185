//! Capped exponential backoff for throttled collaborator calls.
//!
//! Only [`Error::Throttled`] is retried. The same request is re-issued after a
//! delay that doubles per attempt up to `max_delay`; once `max_attempts`
//! throttled responses have been seen the call fails with
//! [`Error::RetriesExhausted`] instead of looping forever.
//!
//! # Example
//!
//! ```rust
//! use tally_core::retry::{RetryPolicy, retry_throttled};
//!
//! # async fn run() -> tally_core::Result<()> {
//! let policy = RetryPolicy::default();
//! let value = retry_throttled(&policy, "describe", || async { Ok::<_, tally_core::Error>(42) }).await?;
//! assert_eq!(value, 42);
//! # Ok(())
//! # }
//! ```

use std::future::Future;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::metrics;

/// Default number of attempts before giving up on a throttled call.
pub const DEFAULT_MAX_ATTEMPTS: u32 = 8;

/// Base backoff duration.
const BACKOFF_BASE: Duration = Duration::from_secs(1);

/// Maximum backoff duration.
const BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Retry budget for throttled calls.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryPolicy {
    /// Total attempts allowed, including the first.
    pub max_attempts: u32,
    /// Delay before the first retry.
    pub base_delay: Duration,
    /// Upper bound for any single delay.
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            base_delay: BACKOFF_BASE,
            max_delay: BACKOFF_MAX,
        }
    }
}

impl RetryPolicy {
    /// Sets the attempt budget.
    #[must_use]
    pub const fn with_max_attempts(mut self, max_attempts: u32) -> Self {
        self.max_attempts = max_attempts;
        self
    }

    /// Sets the base delay.
    #[must_use]
    pub const fn with_base_delay(mut self, base_delay: Duration) -> Self {
        self.base_delay = base_delay;
        self
    }

    /// Returns the delay after the `retry`-th throttled response (1-based), without jitter.
    #[must_use]
    pub fn backoff(&self, retry: u32) -> Duration {
        let factor = 1u32
            .checked_shl(retry.saturating_sub(1))
            .unwrap_or(u32::MAX);
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// Runs `call`, re-issuing it on throttling until it succeeds, fails otherwise,
/// or the attempt budget is spent.
///
/// # Errors
///
/// Returns the first non-throttling error unchanged, or
/// [`Error::RetriesExhausted`] after `policy.max_attempts` throttled attempts.
pub async fn retry_throttled<T, F, Fut>(policy: &RetryPolicy, operation: &str, mut call: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempts = 0;

    loop {
        match call().await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() => {
                attempts += 1;
                if attempts >= policy.max_attempts {
                    return Err(Error::RetriesExhausted {
                        operation: operation.to_string(),
                        attempts,
                        last_error: err.to_string(),
                    });
                }

                let delay = policy.backoff(attempts) + Duration::from_millis(rand_jitter());
                tracing::debug!(operation, attempts, ?delay, "throttled, backing off");
                metrics::record_throttle_retry(operation);
                tokio::time::sleep(delay).await;
            }
            Err(err) => return Err(err),
        }
    }
}

/// Generates random jitter for backoff (0-50ms).
fn rand_jitter() -> u64 {
    use std::time::SystemTime;
    let seed = u64::from(
        SystemTime::now()
            .duration_since(SystemTime::UNIX_EPOCH)
            .unwrap_or_default()
            .subsec_nanos(),
    );
    seed % 50
}
