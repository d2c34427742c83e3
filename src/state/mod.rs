//! Durable job + segment progress record.
//!
//! The state record is the engine's single source of truth for resume: it is
//! created when a job starts, rewritten atomically on every segment
//! transition (and periodically while streaming), and deleted only after the
//! finalizer has confirmed the output file. Only the supervisor loop writes
//! it; workers publish byte counts through per-segment atomics instead.

pub mod persist;

use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::error::StateMismatch;
use crate::segment::{Segment, SegmentStatus};

/// Current state-file schema version.
pub const STATE_VERSION: u32 = 1;

/// Identity of one download job. Immutable after planning.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobRecord {
    pub locator: String,
    pub destination: PathBuf,
    pub total_size: u64,
    /// Derived from locator + size; detects mismatches on resume.
    pub identity_token: String,
    /// Unix seconds.
    pub created_at: u64,
}

/// Persisted per-segment progress.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SegmentRecord {
    pub index: usize,
    pub start: u64,
    pub end: u64,
    pub bytes_completed: u64,
    pub status: SegmentStatus,
    pub attempt_count: u32,
}

impl SegmentRecord {
    pub fn segment(&self) -> Segment {
        Segment { start: self.start, end: self.end }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }
}

/// The persisted form of a job: identity, segments, and freshness markers.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StateRecord {
    pub version: u32,
    pub job: JobRecord,
    /// ETag captured at probe time, when the server sent one.
    pub etag: Option<String>,
    /// Last-Modified captured at probe time, when the server sent one.
    pub last_modified: Option<String>,
    pub segments: Vec<SegmentRecord>,
    /// Unix seconds of the last state-changing event.
    pub last_activity: u64,
}

/// Token derived from locator and total size; two jobs with the same token
/// refer to the same remote content for resume purposes.
pub fn identity_token(locator: &str, total_size: u64) -> String {
    let mut hasher = Sha256::new();
    hasher.update(locator.as_bytes());
    hasher.update(b"|");
    hasher.update(total_size.to_le_bytes());
    hex::encode(hasher.finalize())
}

pub fn unix_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

impl StateRecord {
    /// Fresh record for a newly planned job.
    pub fn new(
        locator: &str,
        destination: &Path,
        total_size: u64,
        segments: &[Segment],
        etag: Option<String>,
        last_modified: Option<String>,
    ) -> Self {
        let now = unix_now();
        StateRecord {
            version: STATE_VERSION,
            job: JobRecord {
                locator: locator.to_string(),
                destination: destination.to_path_buf(),
                total_size,
                identity_token: identity_token(locator, total_size),
                created_at: now,
            },
            etag,
            last_modified,
            segments: segments
                .iter()
                .enumerate()
                .map(|(index, s)| SegmentRecord {
                    index,
                    start: s.start,
                    end: s.end,
                    bytes_completed: 0,
                    status: SegmentStatus::Pending,
                    attempt_count: 0,
                })
                .collect(),
            last_activity: now,
        }
    }

    /// Compares this record against the current probe of the same locator.
    ///
    /// The identity token (locator + size) must match exactly; ETag and
    /// Last-Modified are compared only when both sides have a value, so a
    /// server that stops sending them does not strand an otherwise valid
    /// resume. Any difference is reported field by field; the engine never
    /// silently discards mismatched state.
    pub fn validate_resume(
        &self,
        locator: &str,
        total_size: u64,
        etag: Option<&str>,
        last_modified: Option<&str>,
    ) -> Result<(), StateMismatch> {
        let token_ok = self.job.identity_token == identity_token(&self.job.locator, self.job.total_size);
        let mismatch = StateMismatch {
            locator_changed: self.job.locator != locator,
            // A token that no longer matches its own fields means the record
            // was edited or truncated; treat it like a size change.
            size_changed: self.job.total_size != total_size || !token_ok,
            etag_changed: matches!((self.etag.as_deref(), etag), (Some(a), Some(b)) if a != b),
            last_modified_changed: matches!(
                (self.last_modified.as_deref(), last_modified),
                (Some(a), Some(b)) if a != b
            ),
        };
        if mismatch.any() {
            return Err(mismatch);
        }
        Ok(())
    }

    /// Prepares a validated record for a new run: `InProgress` and `Failed`
    /// segments become `Pending` again with their watermark preserved (the
    /// transport can continue mid-segment); `Complete` segments are left
    /// alone and excluded from new work.
    pub fn reconcile_for_resume(&mut self) {
        for seg in &mut self.segments {
            match seg.status {
                SegmentStatus::InProgress | SegmentStatus::Failed => {
                    seg.status = SegmentStatus::Pending;
                    seg.bytes_completed = seg.bytes_completed.min(seg.len());
                }
                SegmentStatus::Pending | SegmentStatus::Complete => {}
            }
        }
        self.touch();
    }

    pub fn touch(&mut self) {
        self.last_activity = unix_now();
    }

    pub fn all_complete(&self) -> bool {
        self.segments.iter().all(|s| s.status == SegmentStatus::Complete)
    }

    /// Sum of completed-byte watermarks across all segments.
    pub fn bytes_done(&self) -> u64 {
        self.segments.iter().map(|s| s.bytes_completed).sum()
    }

    pub fn completed_segments(&self) -> usize {
        self.segments
            .iter()
            .filter(|s| s.status == SegmentStatus::Complete)
            .count()
    }
}

/// Path of the state file that belongs to `destination` (`<dest>.state`).
pub fn state_path_for(destination: &Path) -> PathBuf {
    let mut os = destination.as_os_str().to_os_string();
    os.push(".state");
    PathBuf::from(os)
}
