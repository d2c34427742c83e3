//! Finalization: verify the completed part file and move it into place.

use std::path::{Path, PathBuf};

use crate::checksum::sha256_path;
use crate::error::EngineError;
use crate::state::persist::StateFile;
use crate::storage::PartWriter;

/// Validates the completed download and promotes the part file to its
/// destination.
///
/// Verifies the on-disk size against the probed total (and, when the caller
/// supplied one, the SHA-256 digest), renames `.part` over the destination,
/// and deletes the state file. On verification failure the state file is
/// preserved so the job can be re-fetched or inspected.
pub fn finalize_job(
    writer: PartWriter,
    destination: &Path,
    total_size: u64,
    expected_sha256: Option<&str>,
    state_file: &StateFile,
) -> Result<PathBuf, EngineError> {
    writer.sync().map_err(|source| EngineError::DiskWrite {
        path: writer.part_path().to_path_buf(),
        source,
    })?;

    let actual_size = writer.len().map_err(|source| EngineError::DiskWrite {
        path: writer.part_path().to_path_buf(),
        source,
    })?;
    if actual_size != total_size {
        return Err(EngineError::Corruption {
            path: writer.part_path().to_path_buf(),
            expected: format!("{} bytes", total_size),
            actual: format!("{} bytes", actual_size),
        });
    }

    if let Some(expected) = expected_sha256 {
        let part_path = writer.part_path().to_path_buf();
        let actual = sha256_path(&part_path).map_err(|source| EngineError::DiskWrite {
            path: part_path.clone(),
            source,
        })?;
        if !actual.eq_ignore_ascii_case(expected) {
            return Err(EngineError::Corruption {
                path: part_path,
                expected: expected.to_ascii_lowercase(),
                actual,
            });
        }
    }

    writer
        .finalize(destination)
        .map_err(|source| EngineError::DiskWrite {
            path: destination.to_path_buf(),
            source,
        })?;
    state_file.delete()?;
    tracing::info!(destination = %destination.display(), total_size, "download finalized");
    Ok(destination.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::segment::plan_segments;
    use crate::state::{state_path_for, StateRecord};
    use crate::storage::{part_path_for, PartFileBuilder};

    fn setup(dir: &Path, body: &[u8]) -> (PartWriter, PathBuf, StateFile) {
        let dest = dir.join("out.bin");
        let mut b = PartFileBuilder::create(&part_path_for(&dest)).unwrap();
        b.preallocate(body.len() as u64).unwrap();
        let w = b.build();
        w.write_at(0, body).unwrap();
        let state = StateFile::new(state_path_for(&dest));
        let segs = plan_segments(body.len() as u64, 2);
        state
            .save(&StateRecord::new("http://t/x", &dest, body.len() as u64, &segs, None, None))
            .unwrap();
        (w, dest, state)
    }

    #[test]
    fn success_renames_and_removes_state() {
        let dir = tempfile::tempdir().unwrap();
        let (w, dest, state) = setup(dir.path(), b"hello world");
        let out = finalize_job(w, &dest, 11, None, &state).unwrap();
        assert_eq!(out, dest);
        assert_eq!(std::fs::read(&dest).unwrap(), b"hello world");
        assert!(!state.exists());
        assert!(!part_path_for(&dest).exists());
    }

    #[test]
    fn size_mismatch_is_corruption_and_preserves_state() {
        let dir = tempfile::tempdir().unwrap();
        let (w, dest, state) = setup(dir.path(), b"hello world");
        let err = finalize_job(w, &dest, 999, None, &state).unwrap_err();
        assert!(matches!(err, EngineError::Corruption { .. }));
        assert!(state.exists());
        assert!(!dest.exists());
    }

    #[test]
    fn checksum_verified_when_supplied() {
        let dir = tempfile::tempdir().unwrap();
        let (w, dest, state) = setup(dir.path(), b"hello\n");
        // sha256 of "hello\n"
        let good = "5891b5b522d5df086d0ff0b110fbd9d21bb4fc7163af34d08286a2e846f6be03";
        finalize_job(w, &dest, 6, Some(good), &state).unwrap();

        let (w2, dest2, state2) = setup(dir.path(), b"hello\n");
        let err = finalize_job(w2, &dest2, 6, Some("deadbeef"), &state2).unwrap_err();
        assert!(matches!(err, EngineError::Corruption { .. }));
        assert!(state2.exists());
    }
}
