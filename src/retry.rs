//! Retry with quadratic backoff

use std::future::Future;
use std::time::Duration;
use tokio::time::sleep;
use tracing::warn;

/// Maximum backoff delay (60 seconds)
const MAX_BACKOFF: Duration = Duration::from_secs(60);

/// Delay before retrying after failed attempt number `attempt` (from 1)
pub fn backoff_delay(base_delay: Duration, attempt: u32) -> Duration {
    base_delay
        .checked_mul(attempt.saturating_mul(attempt))
        .unwrap_or(MAX_BACKOFF)
        .min(MAX_BACKOFF)
}

/// Run `operation(attempt)` until it succeeds.
///
/// After a failure it sleeps `base_delay * attempt^2` and tries again; once
/// `max_retries` retries are used up the last error is returned.
pub async fn execute_and_retry<T, E, F, Fut>(
    mut operation: F,
    max_retries: u32,
    base_delay: Duration,
) -> Result<T, E>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => return Ok(value),
            Err(e) if attempt > max_retries => return Err(e),
            Err(e) => {
                let delay = backoff_delay(base_delay, attempt);
                warn!(
                    attempt,
                    max_retries,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Operation failed, retrying..."
                );
                sleep(delay).await;
            }
        }
    }
}
