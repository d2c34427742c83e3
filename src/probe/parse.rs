//! Parse HTTP response header lines into probe metadata.

use super::HeaderInfo;

/// Parse collected header lines. Unknown headers are ignored; a malformed
/// value simply leaves its field unset.
pub(crate) fn parse_headers(lines: &[String]) -> HeaderInfo {
    let mut info = HeaderInfo::default();

    for line in lines {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        if let Some((name, value)) = line.split_once(':') {
            let name = name.trim();
            let value = value.trim();
            if name.eq_ignore_ascii_case("content-length") {
                if let Ok(n) = value.parse::<u64>() {
                    info.content_length = Some(n);
                }
            }
            if name.eq_ignore_ascii_case("accept-ranges") {
                info.accept_ranges = value.eq_ignore_ascii_case("bytes");
            }
            if name.eq_ignore_ascii_case("content-range") {
                info.content_range_total = parse_content_range_total(value);
            }
            if name.eq_ignore_ascii_case("etag") {
                info.etag = Some(value.trim_matches('"').to_string());
            }
            if name.eq_ignore_ascii_case("last-modified") {
                info.last_modified = Some(value.to_string());
            }
        }
    }

    info
}

/// Total size from a `Content-Range` value (`bytes 0-0/12345`). `*` totals
/// are treated as unknown.
fn parse_content_range_total(value: &str) -> Option<u64> {
    let (_, total) = value.rsplit_once('/')?;
    total.trim().parse::<u64>().ok()
}
