//! Metadata probing: total size and range-request support.
//!
//! First a HEAD request for `Content-Length`, `Accept-Ranges`, and
//! ETag/Last-Modified. Some servers block HEAD or omit the length, so the
//! prober falls back to a one-byte ranged GET and reads the total from
//! `Content-Range`. Both run under the engine's retry policy.

mod parse;

use std::str;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use crate::config::EngineConfig;
use crate::control::CancelToken;
use crate::error::EngineError;
use crate::retry::{run_with_retry, RetryPolicy, TransferError};

/// Headers relevant to planning and resume, parsed from one response.
#[derive(Debug, Clone, Default)]
pub(crate) struct HeaderInfo {
    pub content_length: Option<u64>,
    pub accept_ranges: bool,
    pub content_range_total: Option<u64>,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Probe outcome: everything the planner and state record need.
#[derive(Debug, Clone)]
pub struct SourceInfo {
    /// Authoritative total size in bytes.
    pub total_size: u64,
    /// True if the server honors byte-range requests.
    pub accept_ranges: bool,
    pub etag: Option<String>,
    pub last_modified: Option<String>,
}

/// Probes `url` and determines total size and range support.
///
/// `SizeUnknown` when neither probe yields a length (out of scope, fail
/// fast); `UnreachableSource` when the probe cannot complete after the
/// configured retries.
pub fn probe_source(
    url: &str,
    cfg: &EngineConfig,
    cancel: &CancelToken,
) -> Result<SourceInfo, EngineError> {
    let policy: RetryPolicy = cfg.retry.into();

    let head = run_with_retry(&policy, cancel, || head_request(url, cfg));
    let head = match head {
        Ok(info) => Some(info),
        Err(TransferError::Cancelled) => return Err(EngineError::Cancelled),
        Err(e) => {
            tracing::debug!(url, error = %e, "HEAD probe failed, trying ranged GET probe");
            None
        }
    };

    if let Some(info) = &head {
        if let Some(total) = info.content_length {
            return Ok(SourceInfo {
                total_size: total,
                accept_ranges: info.accept_ranges,
                etag: info.etag.clone(),
                last_modified: info.last_modified.clone(),
            });
        }
    }

    // HEAD blocked or silent about the length: ask for the first byte and
    // read the total out of Content-Range.
    match run_with_retry(&policy, cancel, || range_probe_request(url, cfg)) {
        Ok((status, info)) => {
            let total = info.content_range_total.or(match status {
                // A 200 ignored our range; its Content-Length is the total.
                200 => info.content_length,
                _ => None,
            });
            let Some(total_size) = total else {
                return Err(EngineError::SizeUnknown { url: url.to_string() });
            };
            Ok(SourceInfo {
                total_size,
                accept_ranges: status == 206 || info.accept_ranges,
                etag: info.etag.or_else(|| head.as_ref().and_then(|h| h.etag.clone())),
                last_modified: info
                    .last_modified
                    .or_else(|| head.as_ref().and_then(|h| h.last_modified.clone())),
            })
        }
        Err(TransferError::Cancelled) => Err(EngineError::Cancelled),
        Err(source) => {
            // The HEAD may have succeeded without a length; that is a
            // size-unknown source, not an unreachable one.
            if head.is_some() {
                return Err(EngineError::SizeUnknown { url: url.to_string() });
            }
            Err(EngineError::UnreachableSource {
                url: url.to_string(),
                source,
            })
        }
    }
}

fn apply_common_options(
    easy: &mut curl::easy::Easy,
    url: &str,
    cfg: &EngineConfig,
) -> Result<(), TransferError> {
    easy.url(url).map_err(TransferError::Curl)?;
    easy.useragent(&cfg.user_agent).map_err(TransferError::Curl)?;
    easy.follow_location(true).map_err(TransferError::Curl)?;
    easy.connect_timeout(cfg.connect_timeout)
        .map_err(TransferError::Curl)?;
    easy.timeout(Duration::from_secs(30).min(cfg.request_timeout))
        .map_err(TransferError::Curl)?;
    Ok(())
}

/// Performs a HEAD request and returns the parsed headers.
fn head_request(url: &str, cfg: &EngineConfig) -> Result<HeaderInfo, TransferError> {
    let mut lines: Vec<String> = Vec::new();

    let mut easy = curl::easy::Easy::new();
    apply_common_options(&mut easy, url, cfg)?;
    easy.nobody(true).map_err(TransferError::Curl)?;

    {
        let mut transfer = easy.transfer();
        transfer
            .header_function(|data| {
                if let Ok(s) = str::from_utf8(data) {
                    lines.push(s.trim_end().to_string());
                }
                true
            })
            .map_err(TransferError::Curl)?;
        transfer.perform().map_err(TransferError::Curl)?;
    }

    let code = easy.response_code().map_err(TransferError::Curl)?;
    if !(200..300).contains(&code) {
        return Err(TransferError::Http(code));
    }

    Ok(parse::parse_headers(&lines))
}

/// Performs a `Range: bytes=0-0` GET, keeping only the headers. The body is
/// cut off after the first chunk so a server that ignores the range does not
/// stream the whole file into the probe.
fn range_probe_request(
    url: &str,
    cfg: &EngineConfig,
) -> Result<(u32, HeaderInfo), TransferError> {
    let lines: Arc<Mutex<Vec<String>>> = Arc::new(Mutex::new(Vec::new()));
    let lines_cb = Arc::clone(&lines);

    let mut easy = curl::easy::Easy::new();
    apply_common_options(&mut easy, url, cfg)?;
    easy.range("0-0").map_err(TransferError::Curl)?;

    let perform_result = {
        let mut transfer = easy.transfer();
        transfer
            .header_function(move |data| {
                if let Ok(s) = str::from_utf8(data) {
                    lines_cb.lock().unwrap().push(s.trim_end().to_string());
                }
                true
            })
            .map_err(TransferError::Curl)?;
        // Returning 0 aborts the transfer; headers are already captured.
        transfer
            .write_function(|_| Ok(0))
            .map_err(TransferError::Curl)?;
        transfer.perform()
    };
    if let Err(e) = perform_result {
        // The deliberate body cut-off surfaces as a write error.
        if !e.is_write_error() {
            return Err(TransferError::Curl(e));
        }
    }

    let code = easy.response_code().map_err(TransferError::Curl)?;
    if !(200..300).contains(&code) {
        return Err(TransferError::Http(code));
    }

    let lines = lines.lock().unwrap().clone();
    Ok((code, parse::parse_headers(&lines)))
}
