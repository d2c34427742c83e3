//! Public error taxonomy for the engine.
//!
//! Transient network failures never appear here: they are absorbed by the
//! retry layer. Everything else surfaces as a single terminal `EngineError`
//! carrying enough detail (segment indices, offsets) for diagnosis and resume.

use std::path::PathBuf;
use thiserror::Error;

use crate::retry::TransferError;

/// Field-level detail for a resume request against incompatible prior state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StateMismatch {
    pub locator_changed: bool,
    pub size_changed: bool,
    pub etag_changed: bool,
    pub last_modified_changed: bool,
}

impl StateMismatch {
    pub fn any(&self) -> bool {
        self.locator_changed || self.size_changed || self.etag_changed || self.last_modified_changed
    }
}

impl std::fmt::Display for StateMismatch {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let mut parts = Vec::new();
        if self.locator_changed {
            parts.push("locator");
        }
        if self.size_changed {
            parts.push("size");
        }
        if self.etag_changed {
            parts.push("ETag");
        }
        if self.last_modified_changed {
            parts.push("Last-Modified");
        }
        write!(f, "{}", parts.join(", "))
    }
}

/// Terminal result of a job or of `start` itself.
#[derive(Debug, Error)]
pub enum EngineError {
    /// Probe/connect failure after the configured retries. Fatal.
    #[error("source unreachable: {url}: {source}")]
    UnreachableSource {
        url: String,
        #[source]
        source: TransferError,
    },

    /// Neither HEAD nor a ranged probe yielded a total size. Fatal;
    /// size-unknown downloads are out of scope.
    #[error("could not determine total size for {url}")]
    SizeUnknown { url: String },

    /// Resume requested against a state file that does not match the current
    /// remote resource. The caller decides whether to discard and replan.
    #[error("existing state does not match remote resource ({mismatch}); pass resume=false to start fresh")]
    StateMismatch { mismatch: StateMismatch },

    /// A segment hit a non-retryable request failure (resource gone, access
    /// denied, range rejected or not honored). The whole job aborts.
    #[error("segment {segment} (offset {offset}): {source}")]
    PermanentRequest {
        segment: usize,
        /// Byte offset the segment had reached when the request failed.
        offset: u64,
        #[source]
        source: TransferError,
    },

    /// One or more segments exhausted their retry budget. Completed segments
    /// remain on disk and the state file is preserved for a future resume.
    #[error("segments {failed:?} exhausted their retry budget; job is resumable")]
    PartialFailure { failed: Vec<usize> },

    /// Local disk failure. Not retried: it implies an environment problem.
    #[error("disk write failed for {path}")]
    DiskWrite {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Post-completion verification failed; state is preserved.
    #[error("verification failed for {path}: expected {expected}, got {actual}")]
    Corruption {
        path: PathBuf,
        expected: String,
        actual: String,
    },

    /// Job stopped by a cancellation request; state is preserved.
    #[error("job cancelled; progress saved")]
    Cancelled,

    /// State file missing, unreadable, or from an unsupported version.
    #[error("state file {path}: {detail}")]
    StateFile { path: PathBuf, detail: String },

    /// The locator could not be parsed as a URL.
    #[error("invalid locator {url}: {detail}")]
    InvalidLocator { url: String, detail: String },
}
