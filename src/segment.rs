//! Segment type and range planning.

use serde::{Deserialize, Serialize};

/// A single segment: byte range [start, end) (half-open).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Segment {
    /// Start offset (inclusive).
    pub start: u64,
    /// End offset (exclusive).
    pub end: u64,
}

impl Segment {
    /// Length of this segment in bytes.
    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.start >= self.end
    }

    /// HTTP Range header value for the remaining bytes, given how many have
    /// already been written: `(start + done)-(end - 1)` inclusive.
    pub fn range_value_from(&self, done: u64) -> String {
        let from = self.start.saturating_add(done).min(self.end.saturating_sub(1));
        format!("{}-{}", from, self.end.saturating_sub(1))
    }
}

/// Lifecycle state of one segment.
///
/// `Pending -> InProgress -> {Complete | Failed}`; a `Failed` segment from a
/// prior run is reset to `Pending` on resume with its watermark preserved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SegmentStatus {
    Pending,
    InProgress,
    Complete,
    Failed,
}

/// Builds a segment plan covering `[0, total_size)` exactly.
///
/// `requested` is clamped to at most `total_size` segments (tiny files) and
/// to at least 1. Segments share `total_size / count` bytes each; the final
/// segment absorbs the remainder. Returns an empty vec when `total_size` is
/// 0 (nothing to fetch; the job finalizes to an empty file).
pub fn plan_segments(total_size: u64, requested: usize) -> Vec<Segment> {
    if total_size == 0 {
        return Vec::new();
    }
    let count = (requested.max(1) as u64).min(total_size);
    let base = total_size / count;

    let mut out = Vec::with_capacity(count as usize);
    for i in 0..count {
        let start = i * base;
        let end = if i == count - 1 { total_size } else { (i + 1) * base };
        out.push(Segment { start, end });
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_cover(segs: &[Segment], total: u64) {
        let mut expected_start = 0u64;
        for s in segs {
            assert_eq!(s.start, expected_start, "segments must be contiguous");
            assert!(s.end > s.start, "segments must be non-empty");
            expected_start = s.end;
        }
        assert_eq!(expected_start, total, "union must equal [0, total)");
    }

    #[test]
    fn plan_even_split() {
        let segs = plan_segments(100_000_000, 4);
        assert_eq!(segs.len(), 4);
        for s in &segs {
            assert_eq!(s.len(), 25_000_000);
        }
        assert_cover(&segs, 100_000_000);
    }

    #[test]
    fn last_segment_absorbs_remainder() {
        let segs = plan_segments(10, 4);
        assert_eq!(segs.len(), 4);
        assert_eq!(segs[0].len(), 2);
        assert_eq!(segs[1].len(), 2);
        assert_eq!(segs[2].len(), 2);
        assert_eq!(segs[3].len(), 4);
        assert_cover(&segs, 10);
    }

    #[test]
    fn tiny_file_clamps_segment_count() {
        let segs = plan_segments(3, 64);
        assert_eq!(segs.len(), 3);
        assert_cover(&segs, 3);
        let segs = plan_segments(1, 8);
        assert_eq!(segs.len(), 1);
        assert_cover(&segs, 1);
    }

    #[test]
    fn zero_requested_still_plans_one() {
        let segs = plan_segments(100, 0);
        assert_eq!(segs.len(), 1);
        assert_cover(&segs, 100);
    }

    #[test]
    fn zero_size_plans_nothing() {
        assert!(plan_segments(0, 4).is_empty());
    }

    #[test]
    fn cover_invariant_holds_for_many_shapes() {
        for total in [1u64, 2, 7, 63, 64, 65, 1023, 4096, 100_001] {
            for count in [1usize, 2, 3, 7, 16, 64, 1000] {
                let segs = plan_segments(total, count);
                assert!(segs.len() <= total as usize);
                assert_cover(&segs, total);
            }
        }
    }

    #[test]
    fn range_value_accounts_for_watermark() {
        let s = Segment { start: 100, end: 200 };
        assert_eq!(s.range_value_from(0), "100-199");
        assert_eq!(s.range_value_from(40), "140-199");
    }
}
