//! Builder for creating and preallocating the part file.

use std::fs::File;
use std::io;
use std::path::Path;

use super::writer::PartWriter;
#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Builder for a new part file. Call `preallocate` then `build` to get a
/// `PartWriter` that supports concurrent `write_at` from multiple workers.
pub struct PartFileBuilder {
    file: File,
    part_path: std::path::PathBuf,
}

impl PartFileBuilder {
    /// Create the part file at `part_path`, truncating any previous one.
    pub fn create(part_path: &Path) -> io::Result<Self> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(part_path)?;
        Ok(PartFileBuilder {
            file,
            part_path: part_path.to_path_buf(),
        })
    }

    /// Preallocate `size` bytes. On Unix tries `posix_fallocate` for real
    /// block allocation; falls back to `set_len` on failure or non-Unix.
    pub fn preallocate(&mut self, size: u64) -> io::Result<()> {
        // posix_fallocate rejects a zero length.
        #[cfg(unix)]
        if size > 0 {
            let fd = self.file.as_raw_fd();
            let r = unsafe { libc::posix_fallocate(fd, 0, size as libc::off_t) };
            if r == 0 {
                return Ok(());
            }
            tracing::debug!(errno = r, "posix_fallocate failed, falling back to set_len");
        }
        self.file.set_len(size)
    }

    /// Finish building and return a writer that can be shared across workers.
    pub fn build(self) -> PartWriter {
        PartWriter::from_file_and_path(self.file, self.part_path)
    }
}
