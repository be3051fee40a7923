//! Rate-limit guard
//!
//! Provider calls that can be flood-controlled go through [`with_rate_limit`].
//! On a `RateLimited` signal only the calling operation sleeps for the
//! mandated duration and is then re-invoked. The loop is bounded by an attempt
//! counter and a cumulative wait budget.

use std::future::Future;
use std::time::Duration;
use tracing::warn;

use crate::moderation::{ModerationError, ModerationResult};

/// Bounds for rate-limit retries
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total invocations allowed, including the first one
    pub max_attempts: u32,
    /// Upper bound on the sum of all mandated waits
    pub max_total_wait: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_total_wait: Duration::from_secs(300),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_attempts: u32, max_total_wait: Duration) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            max_total_wait,
        }
    }
}

/// Run `operation`, sleeping and retrying whenever it reports `RateLimited`
///
/// Any other error is returned immediately.
///
/// # Errors
///
/// Returns the operation's own error, or `RetryBudgetExhausted` when the next
/// wait would exceed the attempt count or the cumulative wait budget.
pub async fn with_rate_limit<T, F, Fut>(
    policy: RetryPolicy,
    operation_name: &str,
    mut operation: F,
) -> ModerationResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = ModerationResult<T>>,
{
    let mut attempts: u32 = 0;
    let mut waited = Duration::ZERO;

    loop {
        attempts += 1;
        match operation().await {
            Err(ModerationError::RateLimited { retry_after }) => {
                let next_total = waited
                    .checked_add(retry_after)
                    .filter(|total| attempts < policy.max_attempts && *total <= policy.max_total_wait);
                let Some(next_total) = next_total else {
                    warn!(
                        operation = operation_name,
                        attempts,
                        waited_secs = waited.as_secs(),
                        "Rate-limit retry budget exhausted"
                    );
                    return Err(ModerationError::RetryBudgetExhausted { attempts, waited });
                };

                warn!(
                    operation = operation_name,
                    attempt = attempts,
                    retry_after_secs = retry_after.as_secs(),
                    "Rate limited by provider, waiting before retry"
                );
                tokio::time::sleep(retry_after).await;
                waited = next_total;
            }
            result => return result,
        }
    }
}
