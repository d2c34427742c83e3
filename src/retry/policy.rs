//! Backoff policy: which error kinds retry, and after how long.

use std::time::Duration;

use crate::config::{BackoffMode, RetryConfig};

/// High-level classification of a transfer failure for retry purposes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Operation timed out (connect/read/low-speed).
    Timeout,
    /// Network-level failure (connection reset, DNS, server closed early).
    Connection,
    /// Server asked us to slow down (408, 429, 503).
    Throttled,
    /// Retryable server-side HTTP status (5xx).
    Http5xx(u16),
    /// Non-retryable request failure: resource gone, access denied, range
    /// rejected or not honored. Aborts the whole job.
    Permanent,
    /// Local disk failure. Not retried.
    Storage,
    /// Cancellation requested. Not retried.
    Cancelled,
}

impl ErrorKind {
    /// True for kinds the retry controller may recover locally.
    pub fn is_transient(self) -> bool {
        matches!(
            self,
            ErrorKind::Timeout | ErrorKind::Connection | ErrorKind::Throttled | ErrorKind::Http5xx(_)
        )
    }
}

/// Decision returned by the retry policy.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    /// Do not retry this error.
    NoRetry,
    /// Retry after the given delay.
    RetryAfter(Duration),
}

/// Per-segment retry policy with fixed or exponential backoff.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    cfg: RetryConfig,
}

impl From<RetryConfig> for RetryPolicy {
    fn from(cfg: RetryConfig) -> Self {
        Self { cfg }
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryConfig::default().into()
    }
}

impl RetryPolicy {
    /// Maximum attempts, including the first.
    pub fn max_attempts(&self) -> u32 {
        self.cfg.max_attempts
    }

    /// Compute the decision for a 1-based `attempt` that failed with `kind`.
    pub fn decide(&self, attempt: u32, kind: ErrorKind) -> RetryDecision {
        if attempt >= self.cfg.max_attempts || !kind.is_transient() {
            return RetryDecision::NoRetry;
        }
        let delay = match self.cfg.mode {
            BackoffMode::Fixed => self.cfg.base_delay,
            BackoffMode::Exponential => {
                let exp = 1u32 << attempt.saturating_sub(1).min(8);
                self.cfg.base_delay.saturating_mul(exp).min(self.cfg.max_delay)
            }
        };
        RetryDecision::RetryAfter(delay)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn policy(max_attempts: u32, mode: BackoffMode) -> RetryPolicy {
        RetryConfig {
            max_attempts,
            mode,
            ..RetryConfig::default()
        }
        .into()
    }

    #[test]
    fn no_retry_for_permanent_storage_cancelled() {
        let p = RetryPolicy::default();
        assert_eq!(p.decide(1, ErrorKind::Permanent), RetryDecision::NoRetry);
        assert_eq!(p.decide(1, ErrorKind::Storage), RetryDecision::NoRetry);
        assert_eq!(p.decide(1, ErrorKind::Cancelled), RetryDecision::NoRetry);
    }

    #[test]
    fn exponential_backoff_grows_and_is_capped() {
        let p = policy(20, BackoffMode::Exponential);
        let d1 = match p.decide(1, ErrorKind::Timeout) {
            RetryDecision::RetryAfter(d) => d,
            _ => panic!("expected retry"),
        };
        let d2 = match p.decide(2, ErrorKind::Timeout) {
            RetryDecision::RetryAfter(d) => d,
            _ => panic!("expected retry"),
        };
        assert!(d2 >= d1);
        let d_last = match p.decide(15, ErrorKind::Timeout) {
            RetryDecision::RetryAfter(d) => d,
            _ => panic!("expected retry"),
        };
        assert!(d_last <= RetryConfig::default().max_delay);
    }

    #[test]
    fn fixed_backoff_is_constant() {
        let p = policy(10, BackoffMode::Fixed);
        let base = RetryConfig::default().base_delay;
        for attempt in 1..9 {
            assert_eq!(
                p.decide(attempt, ErrorKind::Connection),
                RetryDecision::RetryAfter(base)
            );
        }
    }

    #[test]
    fn respects_max_attempts() {
        let p = policy(3, BackoffMode::Exponential);
        assert!(matches!(p.decide(1, ErrorKind::Throttled), RetryDecision::RetryAfter(_)));
        assert!(matches!(p.decide(2, ErrorKind::Throttled), RetryDecision::RetryAfter(_)));
        assert_eq!(p.decide(3, ErrorKind::Throttled), RetryDecision::NoRetry);
    }
}
