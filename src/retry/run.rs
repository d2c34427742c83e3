//! Retry loop: run a closure until success or the policy says stop.

use super::classify;
use super::error::TransferError;
use super::policy::{RetryDecision, RetryPolicy};
use crate::control::CancelToken;

/// Runs a transfer closure until it succeeds or the retry policy says stop.
/// On retryable failure, sleeps for the backoff duration then tries again.
/// Cancellation is observed between attempts (the closure observes it at
/// chunk boundaries itself).
pub fn run_with_retry<T, F>(
    policy: &RetryPolicy,
    cancel: &CancelToken,
    mut f: F,
) -> Result<T, TransferError>
where
    F: FnMut() -> Result<T, TransferError>,
{
    let mut attempt = 1u32;
    loop {
        match f() {
            Ok(v) => return Ok(v),
            Err(e) => {
                if cancel.is_cancelled() {
                    return Err(TransferError::Cancelled);
                }
                let kind = classify::classify(&e);
                match policy.decide(attempt, kind) {
                    RetryDecision::NoRetry => return Err(e),
                    RetryDecision::RetryAfter(d) => {
                        tracing::debug!(attempt, delay_ms = d.as_millis() as u64, error = %e, "retrying transfer");
                        std::thread::sleep(d);
                        attempt += 1;
                    }
                }
            }
        }
    }
}
