//! Atomic state-file persistence.
//!
//! The record is serialized to JSON, written to `<path>.tmp`, and renamed
//! over the real path, so a crash mid-write can never leave a corrupt
//! record: either the old state or the new one is on disk, whole.

use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};

use crate::error::EngineError;

use super::{StateRecord, STATE_VERSION};

/// Handle on one job's state file.
#[derive(Debug, Clone)]
pub struct StateFile {
    path: PathBuf,
}

impl StateFile {
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn exists(&self) -> bool {
        self.path.exists()
    }

    /// Load and version-check an existing record.
    pub fn load(&self) -> Result<StateRecord, EngineError> {
        let data = fs::read_to_string(&self.path).map_err(|e| EngineError::StateFile {
            path: self.path.clone(),
            detail: format!("read failed: {}", e),
        })?;
        let record: StateRecord =
            serde_json::from_str(&data).map_err(|e| EngineError::StateFile {
                path: self.path.clone(),
                detail: format!("parse failed: {}", e),
            })?;
        if record.version != STATE_VERSION {
            return Err(EngineError::StateFile {
                path: self.path.clone(),
                detail: format!(
                    "unsupported state version {} (expected {})",
                    record.version, STATE_VERSION
                ),
            });
        }
        Ok(record)
    }

    /// Write the record atomically (tmp file + rename).
    pub fn save(&self, record: &StateRecord) -> Result<(), EngineError> {
        let json = serde_json::to_string_pretty(record).map_err(|e| EngineError::StateFile {
            path: self.path.clone(),
            detail: format!("serialize failed: {}", e),
        })?;
        let tmp = self.tmp_path();
        let write = || -> std::io::Result<()> {
            let mut f = fs::File::create(&tmp)?;
            f.write_all(json.as_bytes())?;
            f.sync_all()?;
            fs::rename(&tmp, &self.path)
        };
        write().map_err(|source| EngineError::DiskWrite {
            path: self.path.clone(),
            source,
        })
    }

    /// Remove the record (after successful finalization, or on an explicit
    /// fresh start). Missing file is not an error.
    pub fn delete(&self) -> Result<(), EngineError> {
        match fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(source) => Err(EngineError::DiskWrite {
                path: self.path.clone(),
                source,
            }),
        }
    }

    fn tmp_path(&self) -> PathBuf {
        let mut os = self.path.as_os_str().to_os_string();
        os.push(".tmp");
        PathBuf::from(os)
    }
}
