//! Exponential backoff retry helper.
//!
//! Generalizes `server/src/utils/retry.rs::retry_with_backoff_async` from the
//! teacher repo for use by both the generator's two-retry rule and any
//! transient bus operation a caller wants to wrap.

use std::future::Future;
use std::time::Duration;

/// Retries `op` up to `max_attempts` times with exponential backoff starting
/// at `base_delay_ms` (delay doubles each attempt: `base * 2^(n-1)`).
///
/// Returns the successful value, or the last error paired with the number of
/// attempts made, matching the teacher's `Result<T, (E, u32)>` shape.
pub async fn retry_with_backoff_async<T, E, F, Fut>(
    max_attempts: u32,
    base_delay_ms: u64,
    mut op: F,
) -> Result<T, (E, u32)>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, E>>,
    E: std::fmt::Display,
{
    let mut attempts = 0;
    loop {
        attempts += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(err) => {
                if attempts >= max_attempts {
                    return Err((err, attempts));
                }
                let delay_ms = base_delay_ms.saturating_mul(1u64 << (attempts - 1));
                tracing::warn!(
                    attempt = attempts,
                    max_attempts,
                    delay_ms,
                    error = %err,
                    "retrying after failure"
                );
                tokio::time::sleep(Duration::from_millis(delay_ms)).await;
            }
        }
    }
}
