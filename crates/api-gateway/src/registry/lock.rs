//! # Registry Lock
//!
//! Exclusive process-level lock on the registry directory, using `fs2`
//! (flock on Unix, LockFile on Windows). Held for the registry's lifetime.

use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

/// Errors from locking the registry directory
#[derive(Debug, thiserror::Error)]
pub enum LockError {
    /// Lock file could not be created
    #[error("failed to create lock file: {0}")]
    CreateFailed(#[source] io::Error),

    /// Another process holds the lock
    #[error("registry already in use{} ({})", .pid.map(|p| format!(" by process {}", p)).unwrap_or_default(), .path.display())]
    AlreadyLocked { pid: Option<u32>, path: PathBuf },

    /// Failed to write PID to lock file
    #[error("failed to write PID to lock file: {0}")]
    WriteFailed(#[source] io::Error),
}

/// Exclusive lock on a registry directory, released on drop.
#[derive(Debug)]
pub struct RegistryLock {
    file: File,
    path: PathBuf,
}

impl RegistryLock {
    /// Lock file name, next to the store files
    pub const LOCK_FILE: &'static str = "gateway.lock";

    /// Acquire the lock without waiting.
    pub fn acquire(dir: &Path) -> Result<Self, LockError> {
        std::fs::create_dir_all(dir).map_err(LockError::CreateFailed)?;
        let path = dir.join(Self::LOCK_FILE);

        let file = OpenOptions::new()
            .create(true)
            .read(true)
            .write(true)
            .truncate(false)
            .open(&path)
            .map_err(LockError::CreateFailed)?;

        if file.try_lock_exclusive().is_err() {
            return Err(LockError::AlreadyLocked {
                pid: read_pid(&path),
                path,
            });
        }

        let mut file = file;
        file.set_len(0).map_err(LockError::WriteFailed)?;
        writeln!(file, "{}", std::process::id()).map_err(LockError::WriteFailed)?;
        file.sync_all().map_err(LockError::WriteFailed)?;

        Ok(Self { file, path })
    }

    /// Path to the lock file
    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn read_pid(path: &Path) -> Option<u32> {
    std::fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse().ok())
}

impl Drop for RegistryLock {
    fn drop(&mut self) {
        #[allow(clippy::incompatible_msrv)]
        let _ = self.file.unlock();
    }
}
