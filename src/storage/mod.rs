//! Output-file storage: preallocated part file with positional writes.
//!
//! Each segment worker owns a disjoint byte range of the part file, so
//! `write_at` needs no cross-worker locking. The planner guarantees the
//! ranges are disjoint; this module only provides the mechanism.

mod builder;
mod writer;

use std::path::{Path, PathBuf};

pub use builder::PartFileBuilder;
pub use writer::PartWriter;

/// Path of the in-progress download that belongs to `destination`
/// (`<dest>.part`). Renamed over the destination on finalize.
pub fn part_path_for(destination: &Path) -> PathBuf {
    let mut os = destination.as_os_str().to_os_string();
    os.push(".part");
    PathBuf::from(os)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn part_path_appends_suffix() {
        assert_eq!(
            part_path_for(Path::new("/data/out.iso")),
            PathBuf::from("/data/out.iso.part")
        );
    }
}
