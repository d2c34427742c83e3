//! Concurrent offset writer for the part file.

use std::fs::File;
use std::io;
use std::path::Path;
use std::sync::Arc;

#[cfg(unix)]
use std::os::unix::fs::FileExt;

/// Writer for the part file. Safe to clone and use from multiple workers;
/// each `write_at` is independent (pwrite-style).
#[derive(Debug, Clone)]
pub struct PartWriter {
    file: Arc<File>,
    part_path: std::path::PathBuf,
}

impl PartWriter {
    pub(crate) fn from_file_and_path(file: File, part_path: std::path::PathBuf) -> Self {
        Self {
            file: Arc::new(file),
            part_path,
        }
    }

    /// Open an existing part file for resume (read+write, no truncation).
    /// The file must already exist and have been preallocated.
    pub fn open_existing(part_path: &Path) -> io::Result<Self> {
        let file = File::options().read(true).write(true).open(part_path)?;
        Ok(PartWriter {
            file: Arc::new(file),
            part_path: part_path.to_path_buf(),
        })
    }

    /// Write `data` at `offset`. Does not move any shared cursor; safe for
    /// concurrent use across workers with disjoint ranges.
    #[cfg(unix)]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        self.file.write_all_at(data, offset)
    }

    /// Non-Unix fallback: clone the handle, seek, write.
    #[cfg(not(unix))]
    pub fn write_at(&self, offset: u64, data: &[u8]) -> io::Result<()> {
        use std::io::{Seek, SeekFrom, Write};
        let mut f = self.file.try_clone()?;
        f.seek(SeekFrom::Start(offset))?;
        f.write_all(data)
    }

    /// Sync file data to disk. Call before `finalize` for durability.
    pub fn sync(&self) -> io::Result<()> {
        self.file.sync_all()
    }

    /// Current on-disk size of the part file.
    pub fn len(&self) -> io::Result<u64> {
        Ok(self.file.metadata()?.len())
    }

    pub fn part_path(&self) -> &Path {
        &self.part_path
    }

    /// Atomically rename the part file to the final path. Consumes the writer
    /// and closes the file. Fails if `final_path` is on another filesystem.
    pub fn finalize(self, final_path: &Path) -> io::Result<()> {
        let part_path = self.part_path.clone();
        drop(self.file);
        std::fs::rename(&part_path, final_path)
    }
}
