//! Supervisor loop: worker pool, state persistence, outcome resolution.
//!
//! Workers pull segment indices from a shared queue and report transitions
//! over a channel; the supervisor is the only writer of the state record.
//! Byte counts flow through per-segment atomics so the supervisor can fold
//! them into the record (and into progress snapshots) without touching the
//! transfer path.

use std::collections::VecDeque;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::control::CancelToken;
use crate::error::EngineError;
use crate::finalize::finalize_job;
use crate::progress::{
    ProgressPublisher, ProgressSnapshot, SegmentProgress, TerminalStatus,
};
use crate::retry::{classify, run_with_retry, RetryPolicy, TransferError};
use crate::segment::{Segment, SegmentStatus};
use crate::state::persist::StateFile;
use crate::state::StateRecord;
use crate::storage::PartWriter;
use crate::worker::fetch_segment;

enum WorkerMsg {
    Started(usize),
    Done {
        index: usize,
        attempts: u32,
        result: Result<(), TransferError>,
    },
}

pub(crate) struct JobRunner {
    pub cfg: EngineConfig,
    pub locator: String,
    pub destination: PathBuf,
    pub expected_sha256: Option<String>,
    pub ranged: bool,
    pub record: StateRecord,
    pub state_file: StateFile,
    pub writer: PartWriter,
    pub watermarks: Vec<Arc<AtomicU64>>,
    /// Stops workers; set by user cancellation and by fatal errors.
    pub stop: CancelToken,
    /// Set only by `JobHandle::cancel`, to tell the two apart at the end.
    pub user_cancel: CancelToken,
    pub publisher: ProgressPublisher,
}

impl JobRunner {
    pub fn run(mut self) -> Result<PathBuf, EngineError> {
        let pending: Vec<usize> = self
            .record
            .segments
            .iter()
            .filter(|s| s.status != SegmentStatus::Complete)
            .map(|s| s.index)
            .collect();
        if pending.is_empty() {
            return self.finish();
        }

        let queue: Arc<Mutex<VecDeque<usize>>> =
            Arc::new(Mutex::new(pending.iter().copied().collect()));
        let segments: Arc<Vec<Segment>> =
            Arc::new(self.record.segments.iter().map(|s| s.segment()).collect());
        let (tx, rx) = mpsc::channel::<WorkerMsg>();

        let worker_count = self.cfg.max_concurrent.max(1).min(pending.len());
        tracing::debug!(
            workers = worker_count,
            segments = pending.len(),
            ranged = self.ranged,
            "starting worker pool"
        );
        let mut handles = Vec::with_capacity(worker_count);
        for _ in 0..worker_count {
            let queue = Arc::clone(&queue);
            let segments = Arc::clone(&segments);
            let watermarks = self.watermarks.clone();
            let tx = tx.clone();
            let cfg = self.cfg.clone();
            let url = self.locator.clone();
            let writer = self.writer.clone();
            let stop = self.stop.clone();
            let ranged = self.ranged;
            let policy: RetryPolicy = cfg.retry.into();
            handles.push(std::thread::spawn(move || {
                loop {
                    if stop.is_cancelled() {
                        break;
                    }
                    let index = match queue.lock().unwrap().pop_front() {
                        Some(i) => i,
                        None => break,
                    };
                    let _ = tx.send(WorkerMsg::Started(index));
                    let segment = segments[index];
                    let watermark = Arc::clone(&watermarks[index]);
                    let mut attempts = 0u32;
                    let result = run_with_retry(&policy, &stop, || {
                        attempts += 1;
                        fetch_segment(&url, &cfg, segment, &watermark, &writer, &stop, ranged)
                    });
                    let _ = tx.send(WorkerMsg::Done {
                        index,
                        attempts,
                        result,
                    });
                }
            }));
        }
        drop(tx);

        let mut first_error: Option<EngineError> = None;
        let mut exhausted: Vec<usize> = Vec::new();
        let mut interrupted = false;
        loop {
            match rx.recv_timeout(self.cfg.progress_interval) {
                Ok(WorkerMsg::Started(index)) => {
                    self.record.segments[index].status = SegmentStatus::InProgress;
                    self.record.touch();
                    self.persist(&mut first_error);
                    self.publish(true);
                }
                Ok(WorkerMsg::Done {
                    index,
                    attempts,
                    result,
                }) => {
                    let seg = &mut self.record.segments[index];
                    seg.attempt_count += attempts;
                    seg.bytes_completed =
                        self.watermarks[index].load(Ordering::Relaxed).min(seg.len());
                    match result {
                        Ok(()) => {
                            seg.status = SegmentStatus::Complete;
                            seg.bytes_completed = seg.len();
                            tracing::debug!(segment = index, attempts, "segment complete");
                        }
                        Err(TransferError::Cancelled) => {
                            // Watermark stays; the segment resumes later.
                            seg.status = SegmentStatus::Pending;
                            interrupted = true;
                        }
                        Err(e) => {
                            seg.status = SegmentStatus::Failed;
                            let offset = seg.start + seg.bytes_completed;
                            if classify(&e).is_transient() {
                                tracing::warn!(segment = index, attempts, error = %e, "segment failed after retries");
                                exhausted.push(index);
                            } else {
                                tracing::error!(segment = index, error = %e, "fatal error; aborting remaining segments");
                                if first_error.is_none() {
                                    first_error = Some(match e {
                                        TransferError::Storage(source) => EngineError::DiskWrite {
                                            path: self.writer.part_path().to_path_buf(),
                                            source,
                                        },
                                        other => EngineError::PermanentRequest {
                                            segment: index,
                                            offset,
                                            source: other,
                                        },
                                    });
                                }
                                self.stop.cancel();
                            }
                        }
                    }
                    self.record.touch();
                    self.persist(&mut first_error);
                    self.publish(true);
                }
                Err(RecvTimeoutError::Timeout) => {
                    // Periodic durability while streaming.
                    self.sync_watermarks();
                    self.record.touch();
                    self.persist(&mut first_error);
                    self.publish(false);
                }
                Err(RecvTimeoutError::Disconnected) => break,
            }
        }
        for handle in handles {
            if handle.join().is_err() {
                tracing::error!("fetch worker panicked");
            }
        }

        self.sync_watermarks();
        for seg in &mut self.record.segments {
            // A worker never got to report: the queue was drained by the
            // stop token. Pending is the truthful status for resume.
            if seg.status == SegmentStatus::InProgress {
                seg.status = SegmentStatus::Pending;
                interrupted = true;
            }
        }
        self.record.touch();
        self.persist(&mut first_error);

        if let Some(err) = first_error {
            self.publisher.finish(TerminalStatus::Failed {
                detail: err.to_string(),
            });
            return Err(err);
        }
        if self.user_cancel.is_cancelled() || interrupted {
            tracing::info!(
                bytes_done = self.record.bytes_done(),
                "cancelled; state preserved for resume"
            );
            self.publisher.finish(TerminalStatus::Cancelled);
            return Err(EngineError::Cancelled);
        }
        if !exhausted.is_empty() {
            exhausted.sort_unstable();
            let err = EngineError::PartialFailure {
                failed: exhausted,
            };
            self.publisher.finish(TerminalStatus::Failed {
                detail: err.to_string(),
            });
            return Err(err);
        }
        self.finish()
    }

    /// All segments complete: verify, promote, emit the terminal event.
    fn finish(self) -> Result<PathBuf, EngineError> {
        let JobRunner {
            destination,
            expected_sha256,
            record,
            state_file,
            writer,
            publisher,
            ..
        } = self;
        match finalize_job(
            writer,
            &destination,
            record.job.total_size,
            expected_sha256.as_deref(),
            &state_file,
        ) {
            Ok(path) => {
                publisher.finish(TerminalStatus::Completed {
                    destination: path.clone(),
                });
                Ok(path)
            }
            Err(err) => {
                publisher.finish(TerminalStatus::Failed {
                    detail: err.to_string(),
                });
                Err(err)
            }
        }
    }

    /// Saves the record; a persistence failure is itself terminal, so it
    /// stops the workers instead of unwinding past them.
    fn persist(&mut self, first_error: &mut Option<EngineError>) {
        if let Err(e) = self.state_file.save(&self.record) {
            tracing::error!(error = %e, "state persistence failed; stopping workers");
            if first_error.is_none() {
                *first_error = Some(e);
            }
            self.stop.cancel();
        }
    }

    /// Folds worker watermarks into the record for non-complete segments.
    fn sync_watermarks(&mut self) {
        for seg in &mut self.record.segments {
            if seg.status != SegmentStatus::Complete {
                seg.bytes_completed =
                    self.watermarks[seg.index].load(Ordering::Relaxed).min(seg.len());
            }
        }
    }

    fn publish(&mut self, force: bool) {
        let snapshot = snapshot(&self.record, &self.watermarks, self.publisher.elapsed());
        self.publisher.publish(snapshot, force);
    }
}

fn snapshot(
    record: &StateRecord,
    watermarks: &[Arc<AtomicU64>],
    elapsed: Duration,
) -> ProgressSnapshot {
    let segments: Vec<SegmentProgress> = record
        .segments
        .iter()
        .map(|s| {
            let bytes_completed = if s.status == SegmentStatus::Complete {
                s.len()
            } else {
                watermarks[s.index].load(Ordering::Relaxed).min(s.len())
            };
            SegmentProgress {
                index: s.index,
                bytes_completed,
                len: s.len(),
                status: s.status,
            }
        })
        .collect();
    let bytes_done = segments.iter().map(|s| s.bytes_completed).sum();
    ProgressSnapshot {
        bytes_done,
        total_bytes: record.job.total_size,
        elapsed,
        segments,
    }
}
