//! Resumable segmented download engine.
//!
//! Splits a remote resource into byte-range segments, fetches them on a
//! bounded worker pool, persists progress to a state file so an interrupted
//! transfer can continue, and retries transient failures per segment.
//! Callers (CLI/GUI) construct a [`JobRequest`], call
//! [`DownloadEngine::start`], and consume progress events from the handle.

pub mod checksum;
pub mod config;
pub mod control;
pub mod engine;
pub mod error;
pub mod finalize;
pub mod logging;
pub mod probe;
pub mod progress;
pub mod retry;
pub mod segment;
pub mod state;
pub mod storage;
pub mod worker;

pub use config::{BackoffMode, EngineConfig, RetryConfig};
pub use engine::{inspect, DownloadEngine, EventStream, JobHandle, JobMetadata, JobRequest};
pub use error::{EngineError, StateMismatch};
pub use progress::{ProgressEvent, ProgressSnapshot, SegmentProgress, TerminalStatus};
pub use segment::{Segment, SegmentStatus};
