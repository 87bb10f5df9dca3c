//! Exponential backoff for page fetches.
//!
//! Transient errors (see [`ScraperError::is_retriable`]) are retried with a
//! delay of `backoff_base_ms * 2^attempt`, capped at [`MAX_BACKOFF_MS`].
//! Everything else is returned on the first failure.

use std::future::Future;
use std::time::Duration;

use crate::error::ScraperError;

/// Upper bound for a single backoff sleep.
pub(crate) const MAX_BACKOFF_MS: u64 = 60_000;

/// Delay before retry number `attempt + 1`.
pub(crate) fn backoff_delay_ms(backoff_base_ms: u64, attempt: u32) -> u64 {
    backoff_base_ms
        .saturating_mul(1u64 << attempt.min(62))
        .min(MAX_BACKOFF_MS)
}

/// Executes `operation` with exponential backoff retries on transient errors.
///
/// With `max_retries = 3` the operation runs at most 4 times. When every
/// attempt fails the last error is returned unchanged; callers decide how to
/// wrap it.
///
/// | Attempt | Sleep before it (`backoff_base_ms = 1000`) |
/// |---------|------------------------------------------|
/// | 0 | none |
/// | 1 | 1 s |
/// | 2 | 2 s |
/// | 3 | 4 s |
pub(crate) async fn retry_with_backoff<T, F, Fut>(
    max_retries: u32,
    backoff_base_ms: u64,
    mut operation: F,
) -> Result<T, ScraperError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ScraperError>>,
{
    let mut attempt = 0u32;

    loop {
        let err = match operation().await {
            Ok(value) => return Ok(value),
            Err(err) => err,
        };
        if !err.is_retriable() || attempt >= max_retries {
            return Err(err);
        }

        let delay_ms = backoff_delay_ms(backoff_base_ms, attempt);
        tracing::warn!(
            attempt,
            max_retries,
            delay_ms,
            error = %err,
            "transient fetch error, retrying after backoff"
        );
        tokio::time::sleep(Duration::from_millis(delay_ms)).await;
        attempt += 1;
    }
}
