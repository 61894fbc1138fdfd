/*!
 * Bounded retry for units of work that lose an optimistic-concurrency race.
 *
 * Each attempt must open and commit its own transaction so a retry observes
 * the state written by the winner.
 */

use crate::errors::ServiceError;
use metrics::counter;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

const BASE_BACKOFF_MS: u64 = 10;

/// Runs `attempt` until it succeeds, fails with a non-retryable error, or
/// `max_attempts` is exhausted. Exhaustion surfaces as `ServiceError::Conflict`.
///
/// # Example
///
/// ```rust,ignore
/// let order = retry_on_conflict("transition_order", 3, |_| {
///     self.transition_once(order_id, new_status)
/// })
/// .await?;
/// ```
pub async fn retry_on_conflict<T, F, Fut>(
    operation: &'static str,
    max_attempts: u32,
    mut attempt: F,
) -> Result<T, ServiceError>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, ServiceError>>,
{
    let max_attempts = max_attempts.max(1);
    let mut current = 1;

    loop {
        match attempt(current).await {
            Ok(value) => return Ok(value),
            Err(err) if err.is_retryable() && current < max_attempts => {
                warn!(operation, attempt = current, error = %err, "retrying after conflict");
                counter!("payjaro_db.conflict_retries", 1, "operation" => operation);
                tokio::time::sleep(Duration::from_millis(BASE_BACKOFF_MS * current as u64)).await;
                current += 1;
            }
            Err(err) if err.is_retryable() => {
                warn!(operation, attempts = current, error = %err, "giving up after conflicts");
                counter!("payjaro_db.conflict_exhausted", 1, "operation" => operation);
                return Err(ServiceError::Conflict(format!(
                    "{} did not complete after {} attempts",
                    operation, current
                )));
            }
            Err(err) => return Err(err),
        }
    }
}
