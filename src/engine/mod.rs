//! Engine entry points: start, cancel, subscribe, inspect.

mod run;

use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::thread::JoinHandle;

use tokio::sync::mpsc;
use url::Url;

use crate::config::EngineConfig;
use crate::control::CancelToken;
use crate::error::EngineError;
use crate::probe;
use crate::progress::{ProgressEvent, ProgressPublisher};
use crate::segment::plan_segments;
use crate::state::persist::StateFile;
use crate::state::{state_path_for, StateRecord};
use crate::storage::{part_path_for, PartFileBuilder, PartWriter};

/// Everything the engine needs to begin or resume one download.
#[derive(Debug, Clone)]
pub struct JobRequest {
    /// Source URL.
    pub locator: String,
    /// Final output path. The part and state files live next to it.
    pub destination: PathBuf,
    /// Requested segment count; clamped by file size, range support, and
    /// `EngineConfig::max_segments`.
    pub segment_count: usize,
    /// When true, an existing compatible state file is continued; an
    /// incompatible one fails with `StateMismatch`. When false, any prior
    /// state and partial output are discarded (the caller's explicit
    /// decision — the engine never discards on its own).
    pub resume: bool,
    /// Expected SHA-256 of the finished file, verified by the finalizer.
    pub expected_sha256: Option<String>,
}

/// One download engine instance; runs one job per `start` call.
#[derive(Debug, Clone)]
pub struct DownloadEngine {
    cfg: EngineConfig,
}

impl DownloadEngine {
    pub fn new(cfg: EngineConfig) -> Self {
        Self { cfg }
    }

    /// Begins or resumes a download.
    ///
    /// Probes the source, plans segments (or reconciles them with persisted
    /// state), and spawns the worker pool. Returns once the transfer is
    /// running; progress and the terminal result are consumed through the
    /// returned handle. A state record showing every segment complete skips
    /// the probe entirely and goes straight to finalization.
    pub fn start(&self, req: JobRequest) -> Result<JobHandle, EngineError> {
        Url::parse(&req.locator).map_err(|e| EngineError::InvalidLocator {
            url: req.locator.clone(),
            detail: e.to_string(),
        })?;

        let state_file = StateFile::new(state_path_for(&req.destination));
        let part_path = part_path_for(&req.destination);
        let cancel = CancelToken::new();
        let user_cancel = CancelToken::new();

        let (record, writer, ranged) =
            self.prepare(&req, &state_file, &part_path, &cancel)?;

        let watermarks: Vec<Arc<AtomicU64>> = record
            .segments
            .iter()
            .map(|s| Arc::new(AtomicU64::new(s.bytes_completed)))
            .collect();

        let (tx, rx) = mpsc::channel(self.cfg.event_capacity.max(2));
        let publisher = ProgressPublisher::new(tx, self.cfg.progress_interval);

        let runner = run::JobRunner {
            cfg: self.cfg.clone(),
            locator: req.locator,
            destination: req.destination,
            expected_sha256: req.expected_sha256,
            ranged,
            record,
            state_file,
            writer,
            watermarks,
            stop: cancel.clone(),
            user_cancel: user_cancel.clone(),
            publisher,
        };
        let join = std::thread::spawn(move || runner.run());

        Ok(JobHandle {
            stop: cancel,
            user_cancel,
            events: Some(EventStream { rx }),
            join: Some(join),
        })
    }

    /// Loads-or-plans the job: returns the state record to run, the part
    /// writer, and whether ranged requests are in play.
    fn prepare(
        &self,
        req: &JobRequest,
        state_file: &StateFile,
        part_path: &Path,
        cancel: &CancelToken,
    ) -> Result<(StateRecord, PartWriter, bool), EngineError> {
        if req.resume && state_file.exists() {
            let mut record = state_file.load()?;

            if record.all_complete() {
                // Nothing left to fetch: no probe, no requests; the runner
                // goes straight to finalization.
                let writer = open_part_for_resume(part_path, state_file)?;
                return Ok((record, writer, true));
            }

            let info = probe::probe_source(&req.locator, &self.cfg, cancel)?;
            record
                .validate_resume(
                    &req.locator,
                    info.total_size,
                    info.etag.as_deref(),
                    info.last_modified.as_deref(),
                )
                .map_err(|mismatch| EngineError::StateMismatch { mismatch })?;

            if !info.accept_ranges && record.segments.len() > 1 {
                // The server stopped honoring ranges; a multi-segment state
                // cannot be continued over a single full-content stream.
                return Err(EngineError::StateFile {
                    path: state_file.path().to_path_buf(),
                    detail: "source no longer supports range requests; restart with resume=false"
                        .to_string(),
                });
            }

            record.reconcile_for_resume();
            tracing::info!(
                locator = %req.locator,
                complete = record.completed_segments(),
                total = record.segments.len(),
                "resuming from persisted state"
            );
            let writer = open_part_for_resume(part_path, state_file)?;
            return Ok((record, writer, info.accept_ranges));
        }

        // Fresh start: an explicit request to discard whatever was there.
        if !req.resume {
            state_file.delete()?;
        }

        let info = probe::probe_source(&req.locator, &self.cfg, cancel)?;
        let requested = if info.accept_ranges {
            req.segment_count.min(self.cfg.max_segments)
        } else {
            tracing::warn!(locator = %req.locator, "no range support; degrading to a single segment");
            1
        };
        let segments = plan_segments(info.total_size, requested);
        let record = StateRecord::new(
            &req.locator,
            &req.destination,
            info.total_size,
            &segments,
            info.etag,
            info.last_modified,
        );

        if let Some(parent) = req.destination.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent).map_err(|source| EngineError::DiskWrite {
                    path: parent.to_path_buf(),
                    source,
                })?;
            }
        }
        let mut builder =
            PartFileBuilder::create(part_path).map_err(|source| EngineError::DiskWrite {
                path: part_path.to_path_buf(),
                source,
            })?;
        builder
            .preallocate(record.job.total_size)
            .map_err(|source| EngineError::DiskWrite {
                path: part_path.to_path_buf(),
                source,
            })?;
        state_file.save(&record)?;
        tracing::info!(
            locator = %req.locator,
            total_size = record.job.total_size,
            segments = record.segments.len(),
            "planned new download"
        );
        Ok((record, builder.build(), info.accept_ranges))
    }
}

fn open_part_for_resume(
    part_path: &Path,
    state_file: &StateFile,
) -> Result<PartWriter, EngineError> {
    if !part_path.exists() {
        // State claims progress that is not on disk; refuse rather than
        // fabricate bytes.
        return Err(EngineError::StateFile {
            path: state_file.path().to_path_buf(),
            detail: format!(
                "part file {} is missing; restart with resume=false",
                part_path.display()
            ),
        });
    }
    PartWriter::open_existing(part_path).map_err(|source| EngineError::DiskWrite {
        path: part_path.to_path_buf(),
        source,
    })
}

/// Consumer-pull stream of progress events. Finite: ends with exactly one
/// `ProgressEvent::Finished`, after which `next` returns `None`.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<ProgressEvent>,
}

impl EventStream {
    /// Next event, for async consumers.
    pub async fn next(&mut self) -> Option<ProgressEvent> {
        self.rx.recv().await
    }

    /// Next event, for plain threaded consumers.
    pub fn next_blocking(&mut self) -> Option<ProgressEvent> {
        self.rx.blocking_recv()
    }
}

/// Handle on a running job.
#[derive(Debug)]
pub struct JobHandle {
    stop: CancelToken,
    user_cancel: CancelToken,
    events: Option<EventStream>,
    join: Option<JoinHandle<Result<PathBuf, EngineError>>>,
}

impl JobHandle {
    /// Requests cooperative shutdown: each worker finishes its buffered
    /// chunk, watermarks are persisted, and `wait` returns `Cancelled`.
    pub fn cancel(&self) {
        self.user_cancel.cancel();
        self.stop.cancel();
    }

    /// Takes the progress event stream. Yields `None` on the second call:
    /// each job has exactly one event sequence.
    pub fn subscribe(&mut self) -> Option<EventStream> {
        self.events.take()
    }

    /// Blocks until the job reaches a terminal state.
    pub fn wait(mut self) -> Result<PathBuf, EngineError> {
        self.join
            .take()
            .expect("wait called once")
            .join()
            .expect("job supervisor thread panicked")
    }
}

/// Read-only summary of a persisted job, for "list resumable downloads"
/// tooling. No transfer is started and no network request is made.
#[derive(Debug, Clone)]
pub struct JobMetadata {
    pub locator: String,
    pub destination: PathBuf,
    pub total_size: u64,
    pub bytes_done: u64,
    pub segment_count: usize,
    pub completed_segments: usize,
    /// Unix seconds.
    pub created_at: u64,
    /// Unix seconds.
    pub last_activity: u64,
}

/// Inspects a state file. `path` may be the state file itself or the
/// destination path it belongs to.
pub fn inspect(path: &Path) -> Result<JobMetadata, EngineError> {
    let state_path = if path.extension().is_some_and(|e| e == "state") {
        path.to_path_buf()
    } else {
        state_path_for(path)
    };
    let record = StateFile::new(state_path).load()?;
    Ok(JobMetadata {
        locator: record.job.locator.clone(),
        destination: record.job.destination.clone(),
        total_size: record.job.total_size,
        bytes_done: record.bytes_done(),
        segment_count: record.segments.len(),
        completed_segments: record.completed_segments(),
        created_at: record.job.created_at,
        last_activity: record.last_activity,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::SegmentStatus;

    #[test]
    fn inspect_reads_destination_or_state_path() {
        let dir = tempfile::tempdir().unwrap();
        let dest = dir.path().join("file.bin");
        let segs = plan_segments(100, 4);
        let mut record = StateRecord::new("http://h/f", &dest, 100, &segs, None, None);
        record.segments[0].status = SegmentStatus::Complete;
        record.segments[0].bytes_completed = 25;
        StateFile::new(state_path_for(&dest)).save(&record).unwrap();

        let by_dest = inspect(&dest).unwrap();
        assert_eq!(by_dest.total_size, 100);
        assert_eq!(by_dest.segment_count, 4);
        assert_eq!(by_dest.completed_segments, 1);
        assert_eq!(by_dest.bytes_done, 25);

        let by_state = inspect(&state_path_for(&dest)).unwrap();
        assert_eq!(by_state.locator, "http://h/f");
    }

    #[test]
    fn inspect_missing_state_errors() {
        let dir = tempfile::tempdir().unwrap();
        let err = inspect(&dir.path().join("nope.bin")).unwrap_err();
        assert!(matches!(err, EngineError::StateFile { .. }));
    }

    #[test]
    fn start_rejects_bad_locator() {
        let engine = DownloadEngine::new(EngineConfig::default());
        let err = engine
            .start(JobRequest {
                locator: "not a url".into(),
                destination: PathBuf::from("/tmp/x"),
                segment_count: 4,
                resume: false,
                expected_sha256: None,
            })
            .unwrap_err();
        assert!(matches!(err, EngineError::InvalidLocator { .. }));
    }
}
