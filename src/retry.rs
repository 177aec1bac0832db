//! Bounded retries with exponential backoff for transient failures

use crate::config::RetryPolicy;
use crate::error::Result;
use std::thread;
use std::time::Instant;

/// Run `op` until it succeeds, fails permanently, runs out of attempts or
/// would sleep past `deadline`. The attempt number (1-based) is passed in.
///
/// Only errors for which [`RowdiffError::is_transient`] holds are retried;
/// the last error is returned when the budget runs out.
///
/// [`RowdiffError::is_transient`]: crate::error::RowdiffError::is_transient
pub fn retry_with_backoff<T, F>(
    policy: &RetryPolicy,
    deadline: Instant,
    what: &str,
    mut op: F,
) -> Result<T>
where
    F: FnMut(u32) -> Result<T>,
{
    let mut attempt = 1;
    loop {
        match op(attempt) {
            Ok(value) => return Ok(value),
            Err(e) if e.is_transient() && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt);
                if Instant::now() + delay >= deadline {
                    log::warn!("{} failed and the time budget is spent: {}", what, e);
                    return Err(e);
                }
                log::warn!(
                    "{} failed (attempt {}/{}): {}. Retrying in {:?}",
                    what,
                    attempt,
                    policy.max_attempts,
                    e,
                    delay
                );
                thread::sleep(delay);
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}
