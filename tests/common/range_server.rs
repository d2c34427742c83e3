//! In-process HTTP/1.1 origin for integration tests.
//!
//! Serves one static body with HEAD and ranged GET, plus failure injection:
//! blocked HEAD, ignored ranges, transient 503 bursts, a permanently failing
//! range, and throttled body writes (so cancellation can land mid-transfer).

use std::io::{Read, Write};
use std::net::{TcpListener, TcpStream};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::thread;
use std::time::Duration;

#[derive(Debug, Clone)]
pub struct OriginOptions {
    /// If false, HEAD returns 405 (servers that block HEAD).
    pub head_allowed: bool,
    /// If false, GET ignores Range and always sends 200 with the full body.
    pub honor_ranges: bool,
    /// If false, omit `Accept-Ranges: bytes` even when ranges work.
    pub advertise_ranges: bool,
    /// ETag sent on every response, when set.
    pub etag: Option<String>,
    /// The first N GETs fail with 503 before the origin recovers.
    pub fail_first_gets: u32,
    /// Every GET answers with this status and an empty body.
    pub get_status: Option<u32>,
    /// GETs whose range starts at this offset always fail with 503.
    pub fail_range_start: Option<u64>,
    /// GETs whose range starts at this offset get 200 with the full body,
    /// as if the Range header had not been sent.
    pub ignore_range_start: Option<u64>,
    /// Pause between 4 KiB body chunks, to slow transfers down.
    pub chunk_delay: Duration,
}

impl Default for OriginOptions {
    fn default() -> Self {
        Self {
            head_allowed: true,
            honor_ranges: true,
            advertise_ranges: true,
            etag: None,
            fail_first_gets: 0,
            get_status: None,
            fail_range_start: None,
            ignore_range_start: None,
            chunk_delay: Duration::ZERO,
        }
    }
}

/// Request counters and the log of served GET ranges, shared with tests.
#[derive(Debug, Default)]
pub struct Hits {
    pub head: AtomicU32,
    pub get: AtomicU32,
    /// `(start, end_inclusive)` of each GET that served a body; `None` for
    /// full-content requests.
    pub ranges: Mutex<Vec<Option<(u64, u64)>>>,
}

/// A running test origin. The listener thread lives until the process exits.
pub struct Origin {
    pub url: String,
    pub hits: Arc<Hits>,
}

pub fn start(body: Vec<u8>) -> Origin {
    start_with_options(body, OriginOptions::default())
}

pub fn start_with_options(body: Vec<u8>, opts: OriginOptions) -> Origin {
    let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
    let port = listener.local_addr().unwrap().port();
    let body = Arc::new(body);
    let hits = Arc::new(Hits::default());
    let fail_budget = Arc::new(AtomicU32::new(opts.fail_first_gets));
    {
        let hits = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming().flatten() {
                let body = Arc::clone(&body);
                let hits = Arc::clone(&hits);
                let opts = opts.clone();
                let fail_budget = Arc::clone(&fail_budget);
                thread::spawn(move || handle(stream, &body, &opts, &hits, &fail_budget));
            }
        });
    }
    Origin {
        url: format!("http://127.0.0.1:{}/payload.bin", port),
        hits,
    }
}

fn handle(
    mut stream: TcpStream,
    body: &[u8],
    opts: &OriginOptions,
    hits: &Hits,
    fail_budget: &AtomicU32,
) {
    let _ = stream.set_read_timeout(Some(Duration::from_secs(5)));
    let _ = stream.set_write_timeout(Some(Duration::from_secs(5)));
    let mut buf = [0u8; 8192];
    let n = match stream.read(&mut buf) {
        Ok(0) | Err(_) => return,
        Ok(n) => n,
    };
    let request = match std::str::from_utf8(&buf[..n]) {
        Ok(s) => s,
        Err(_) => return,
    };
    let (method, range) = parse_request(request);
    let total = body.len() as u64;

    let etag_header = opts
        .etag
        .as_deref()
        .map(|e| format!("ETag: \"{}\"\r\n", e))
        .unwrap_or_default();
    let ranges_header = if opts.advertise_ranges {
        "Accept-Ranges: bytes\r\n"
    } else {
        ""
    };

    if method.eq_ignore_ascii_case("HEAD") {
        hits.head.fetch_add(1, Ordering::SeqCst);
        if !opts.head_allowed {
            let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n");
            return;
        }
        let response = format!(
            "HTTP/1.1 200 OK\r\nContent-Length: {}\r\n{}{}Connection: close\r\n\r\n",
            total, ranges_header, etag_header
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    if !method.eq_ignore_ascii_case("GET") {
        let _ = stream.write_all(b"HTTP/1.1 405 Method Not Allowed\r\nConnection: close\r\n\r\n");
        return;
    }

    hits.get.fetch_add(1, Ordering::SeqCst);
    if let Some(code) = opts.get_status {
        let response = format!(
            "HTTP/1.1 {} Injected\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
            code
        );
        let _ = stream.write_all(response.as_bytes());
        return;
    }
    let burst_fail = fail_budget
        .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |v| v.checked_sub(1))
        .is_ok();
    let sticky_fail = opts.fail_range_start.is_some()
        && range.map(|(start, _)| start) == opts.fail_range_start;
    if burst_fail || sticky_fail {
        let _ = stream.write_all(
            b"HTTP/1.1 503 Service Unavailable\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
        );
        return;
    }

    let (status_line, extra, slice, served_range) = match range {
        Some((start, _))
            if opts.ignore_range_start == Some(start) =>
        {
            ("200 OK", String::new(), body, None)
        }
        Some((start, end_incl)) if opts.honor_ranges => {
            let start = start.min(total);
            let end_incl = end_incl.min(total.saturating_sub(1));
            if start > end_incl {
                let extra = format!("Content-Range: bytes */{}\r\n", total);
                ("416 Range Not Satisfiable", extra, &body[0..0], None)
            } else {
                let s = start as usize;
                let e = (end_incl + 1) as usize;
                let extra = format!("Content-Range: bytes {}-{}/{}\r\n", start, end_incl, total);
                ("206 Partial Content", extra, &body[s..e], Some((start, end_incl)))
            }
        }
        _ => ("200 OK", String::new(), body, None),
    };
    hits.ranges.lock().unwrap().push(served_range);

    let response = format!(
        "HTTP/1.1 {}\r\nContent-Length: {}\r\n{}{}{}Connection: close\r\n\r\n",
        status_line,
        slice.len(),
        extra,
        ranges_header,
        etag_header
    );
    let _ = stream.write_all(response.as_bytes());
    for chunk in slice.chunks(4096) {
        if stream.write_all(chunk).is_err() {
            return;
        }
        if !opts.chunk_delay.is_zero() {
            thread::sleep(opts.chunk_delay);
        }
    }
}

/// Returns (method, optional `(start, end_inclusive)` from `Range: bytes=X-Y`).
fn parse_request(request: &str) -> (&str, Option<(u64, u64)>) {
    let mut method = "";
    let mut range = None;
    for line in request.lines() {
        let line = line.trim();
        if line.is_empty() {
            break;
        }
        if method.is_empty() {
            method = line.split_whitespace().next().unwrap_or("");
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            if name.trim().eq_ignore_ascii_case("range") {
                if let Some(interval) = value.trim().strip_prefix("bytes=") {
                    if let Some((a, b)) = interval.split_once('-') {
                        let start = a.trim().parse::<u64>().unwrap_or(0);
                        let end_incl = match b.trim() {
                            "" => u64::MAX,
                            s => s.parse::<u64>().unwrap_or(0),
                        };
                        range = Some((start, end_incl));
                    }
                }
            }
        }
    }
    (method, range)
}
