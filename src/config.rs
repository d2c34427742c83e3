//! Engine configuration: explicit and immutable, passed in at construction.

use std::time::Duration;

/// Backoff shape for transient-failure retries.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackoffMode {
    /// Delay doubles per attempt, capped at `max_delay`.
    #[default]
    Exponential,
    /// Constant `base_delay` between attempts.
    Fixed,
}

/// Retry policy parameters for transient failures.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of attempts per segment (including the first).
    pub max_attempts: u32,
    /// Base delay between attempts.
    pub base_delay: Duration,
    /// Upper bound on the backoff delay.
    pub max_delay: Duration,
    /// Fixed or exponential backoff.
    pub mode: BackoffMode,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            base_delay: Duration::from_millis(250),
            max_delay: Duration::from_secs(30),
            mode: BackoffMode::Exponential,
        }
    }
}

/// Immutable configuration for one engine instance.
///
/// There is no ambient global config: the embedding layer (CLI/GUI) loads
/// whatever file format it likes and hands the result here.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// Upper clamp on concurrently running segment workers (socket budget).
    pub max_concurrent: usize,
    /// Upper clamp on planned segments per job.
    pub max_segments: usize,
    /// Retry policy for probe and segment transfers.
    pub retry: RetryConfig,
    /// Connect timeout per request.
    pub connect_timeout: Duration,
    /// Hard wall-clock timeout per request. A hit counts as transient.
    pub request_timeout: Duration,
    /// Abort a transfer if throughput stays below this many bytes/sec...
    pub low_speed_limit: u32,
    /// ...for this long.
    pub low_speed_time: Duration,
    /// Minimum interval between published progress snapshots.
    pub progress_interval: Duration,
    /// Capacity of the bounded progress-event channel.
    pub event_capacity: usize,
    /// User-Agent header sent on every request.
    pub user_agent: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_concurrent: 16,
            max_segments: 64,
            retry: RetryConfig::default(),
            connect_timeout: Duration::from_secs(15),
            request_timeout: Duration::from_secs(3600),
            low_speed_limit: 1024,
            low_speed_time: Duration::from_secs(60),
            progress_interval: Duration::from_millis(200),
            event_capacity: 64,
            user_agent: concat!("segfetch/", env!("CARGO_PKG_VERSION")).to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_values() {
        let cfg = EngineConfig::default();
        assert_eq!(cfg.max_concurrent, 16);
        assert_eq!(cfg.max_segments, 64);
        assert_eq!(cfg.retry.max_attempts, 5);
        assert_eq!(cfg.retry.mode, BackoffMode::Exponential);
        assert!(cfg.event_capacity > 0);
    }
}
