//! Fetch worker: one ranged HTTP GET per segment, streamed to the part file.
//!
//! The worker requests `[start + watermark, end)`, writes each received
//! chunk at its absolute offset, and advances the shared watermark only
//! after the chunk has been handed to the file. On any failure the watermark
//! keeps its last durable value, so a retry (or a later resume) continues
//! mid-segment instead of re-fetching completed bytes. Cancellation is
//! observed at chunk boundaries, never mid-write.

use std::str;
use std::sync::atomic::{AtomicU32, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};

use crate::config::EngineConfig;
use crate::control::CancelToken;
use crate::retry::TransferError;
use crate::segment::Segment;
use crate::storage::PartWriter;

/// Fetches one segment's remaining bytes into the part file.
///
/// `ranged` is false only in the single-segment fallback for servers without
/// range support; there the transfer always restarts from the beginning
/// (the transport cannot resume mid-stream), so the watermark is reset.
pub fn fetch_segment(
    url: &str,
    cfg: &EngineConfig,
    segment: Segment,
    watermark: &Arc<AtomicU64>,
    writer: &PartWriter,
    cancel: &CancelToken,
    ranged: bool,
) -> Result<(), TransferError> {
    if cancel.is_cancelled() {
        return Err(TransferError::Cancelled);
    }
    if !ranged {
        watermark.store(0, Ordering::Relaxed);
    }
    let already = watermark.load(Ordering::Relaxed).min(segment.len());
    if already == segment.len() {
        return Ok(());
    }

    // Status of the response currently being received, set by the header
    // callback so the body callback can refuse to write error bodies (or a
    // full-content body where partial content was required) at the segment
    // offset.
    let status = Arc::new(AtomicU32::new(0));
    let failure: Arc<Mutex<Option<TransferError>>> = Arc::new(Mutex::new(None));

    let mut easy = curl::easy::Easy::new();
    easy.url(url).map_err(TransferError::Curl)?;
    easy.useragent(&cfg.user_agent).map_err(TransferError::Curl)?;
    easy.follow_location(true).map_err(TransferError::Curl)?;
    easy.connect_timeout(cfg.connect_timeout)
        .map_err(TransferError::Curl)?;
    easy.timeout(cfg.request_timeout).map_err(TransferError::Curl)?;
    // Stalled-transfer guard: abort when throughput stays under the
    // configured floor, instead of waiting out the hard timeout.
    easy.low_speed_limit(cfg.low_speed_limit)
        .map_err(TransferError::Curl)?;
    easy.low_speed_time(cfg.low_speed_time)
        .map_err(TransferError::Curl)?;

    if ranged {
        easy.range(&segment.range_value_from(already))
            .map_err(TransferError::Curl)?;
    }

    {
        let status_hdr = Arc::clone(&status);
        let status_body = Arc::clone(&status);
        let failure_cb = Arc::clone(&failure);
        let watermark_cb = Arc::clone(watermark);
        let writer = writer.clone();
        let cancel = cancel.clone();
        let seg_start = segment.start;
        let seg_end = segment.end;

        let mut transfer = easy.transfer();
        transfer
            .header_function(move |data| {
                if let Ok(line) = str::from_utf8(data) {
                    if let Some(code) = parse_status_line(line) {
                        status_hdr.store(code, Ordering::Relaxed);
                    }
                }
                true
            })
            .map_err(TransferError::Curl)?;
        transfer
            .write_function(move |data| {
                if cancel.is_cancelled() {
                    let _ = failure_cb.lock().unwrap().replace(TransferError::Cancelled);
                    return Ok(0);
                }
                let code = status_body.load(Ordering::Relaxed);
                let expected = if ranged { 206 } else { 200 };
                if code != expected {
                    let err = if ranged && code == 200 {
                        TransferError::RangeNotHonored { status: code }
                    } else {
                        TransferError::Http(code)
                    };
                    let _ = failure_cb.lock().unwrap().replace(err);
                    return Ok(0);
                }
                let offset = seg_start + watermark_cb.load(Ordering::Relaxed);
                // Never write past the segment boundary, even if the server
                // sends more than the requested range; the next byte belongs
                // to another worker.
                let remaining = seg_end.saturating_sub(offset) as usize;
                let take = data.len().min(remaining);
                if take == 0 {
                    return Ok(0);
                }
                match writer.write_at(offset, &data[..take]) {
                    Ok(()) => {
                        watermark_cb.fetch_add(take as u64, Ordering::Relaxed);
                        if take < data.len() {
                            return Ok(0);
                        }
                        Ok(data.len())
                    }
                    Err(e) => {
                        let _ = failure_cb.lock().unwrap().replace(TransferError::Storage(e));
                        Ok(0)
                    }
                }
            })
            .map_err(TransferError::Curl)?;
        let perform_result = transfer.perform();
        if let Err(e) = perform_result {
            if let Some(err) = failure.lock().unwrap().take() {
                return Err(err);
            }
            if watermark.load(Ordering::Relaxed) >= segment.len() {
                // Over-delivering server: the tail was cut off at the
                // boundary, but this segment's bytes are all on disk.
                return Ok(());
            }
            return Err(TransferError::Curl(e));
        }
    }

    let code = easy.response_code().map_err(TransferError::Curl)?;
    let expected = if ranged { 206 } else { 200 };
    if code != expected {
        // Empty error bodies never hit the write callback; classify here.
        if ranged && code == 200 {
            return Err(TransferError::RangeNotHonored { status: code });
        }
        return Err(TransferError::Http(code));
    }

    let done = watermark.load(Ordering::Relaxed);
    if done < segment.len() {
        return Err(TransferError::PartialTransfer {
            expected: segment.len() - already,
            received: done - already,
        });
    }

    Ok(())
}

/// Extracts the status code from an `HTTP/x.y CODE reason` line, if this is
/// one (header callbacks also see plain header lines).
fn parse_status_line(line: &str) -> Option<u32> {
    let line = line.trim();
    if !line.starts_with("HTTP/") {
        return None;
    }
    line.split_whitespace().nth(1)?.parse::<u32>().ok()
}
