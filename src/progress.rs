//! Progress aggregation and the job event stream.
//!
//! The aggregator is a pure observer: it reads segment watermarks and
//! statuses, never mutates them. Snapshots are published at a bounded rate
//! regardless of how often workers advance their counters, the overall byte
//! count is monotonically non-decreasing, and every job's stream ends with
//! exactly one terminal event.

use std::path::PathBuf;
use std::time::{Duration, Instant};

use tokio::sync::mpsc;

use crate::segment::SegmentStatus;

/// Per-segment progress breakdown.
#[derive(Debug, Clone)]
pub struct SegmentProgress {
    pub index: usize,
    pub bytes_completed: u64,
    pub len: u64,
    pub status: SegmentStatus,
}

/// One published snapshot of overall progress.
#[derive(Debug, Clone)]
pub struct ProgressSnapshot {
    /// Bytes confirmed written across all segments.
    pub bytes_done: u64,
    pub total_bytes: u64,
    /// Elapsed time since this run started.
    pub elapsed: Duration,
    pub segments: Vec<SegmentProgress>,
}

impl ProgressSnapshot {
    /// Overall rate in bytes per second (0 if no time has passed).
    pub fn bytes_per_sec(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs <= 0.0 {
            return 0.0;
        }
        self.bytes_done as f64 / secs
    }

    /// Estimated seconds remaining (None if the rate is 0 and bytes remain).
    pub fn eta_secs(&self) -> Option<f64> {
        let remaining = self.total_bytes.saturating_sub(self.bytes_done);
        if remaining == 0 {
            return Some(0.0);
        }
        let rate = self.bytes_per_sec();
        if rate <= 0.0 {
            return None;
        }
        Some(remaining as f64 / rate)
    }

    /// Fraction complete in [0.0, 1.0].
    pub fn fraction(&self) -> f64 {
        if self.total_bytes == 0 {
            return 1.0;
        }
        (self.bytes_done as f64 / self.total_bytes as f64).min(1.0)
    }
}

/// How the job ended.
#[derive(Debug, Clone)]
pub enum TerminalStatus {
    /// Output verified and moved to its destination.
    Completed { destination: PathBuf },
    /// Cancelled by request; state preserved for resume.
    Cancelled,
    /// Failed; `detail` is the display form of the terminal `EngineError`.
    Failed { detail: String },
}

/// Event on a job's subscription stream.
#[derive(Debug, Clone)]
pub enum ProgressEvent {
    Progress(ProgressSnapshot),
    /// Always the last event of a stream.
    Finished(TerminalStatus),
}

/// Rate-limited, monotonic publisher feeding the bounded event channel.
/// Progress snapshots are lossy (`try_send`: a slow consumer just sees fewer
/// snapshots); the terminal event is delivered reliably.
pub(crate) struct ProgressPublisher {
    tx: mpsc::Sender<ProgressEvent>,
    interval: Duration,
    started: Instant,
    last_emit: Option<Instant>,
    high_water: u64,
}

impl ProgressPublisher {
    pub fn new(tx: mpsc::Sender<ProgressEvent>, interval: Duration) -> Self {
        Self {
            tx,
            interval,
            started: Instant::now(),
            last_emit: None,
            high_water: 0,
        }
    }

    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// Publish a snapshot unless one went out within the configured
    /// interval. `force` bypasses the rate limit (segment transitions).
    pub fn publish(&mut self, mut snapshot: ProgressSnapshot, force: bool) {
        let now = Instant::now();
        if !force {
            if let Some(last) = self.last_emit {
                if now.duration_since(last) < self.interval {
                    return;
                }
            }
        }
        // The last slot of the bounded channel is reserved for the terminal
        // event so a stalled consumer can never block job completion.
        if self.tx.capacity() <= 1 {
            return;
        }
        // Watermarks can only grow during a run, but keep the published
        // aggregate monotonic even across retry resets.
        self.high_water = self.high_water.max(snapshot.bytes_done);
        snapshot.bytes_done = self.high_water;
        self.last_emit = Some(now);
        let _ = self.tx.try_send(ProgressEvent::Progress(snapshot));
    }

    /// Send the terminal event and close the stream.
    pub fn finish(self, status: TerminalStatus) {
        let _ = self.tx.try_send(ProgressEvent::Finished(status));
    }
}
