//! state::lock
//!
//! Exclusive lock on a state directory.
//!
//! # Invariants
//!
//! - Held for the whole export or import run
//! - Released on drop
//! - [`StateDirLock::acquire`] fails fast if another run holds it;
//!   [`StateDirLock::wait`] retries until a deadline
//!
//! The lock is an OS-level file lock on `<dir>/.lock`, so it also excludes
//! runs in other processes.

use std::fs::{self, File, OpenOptions};
use std::path::{Path, PathBuf};
use std::thread;
use std::time::{Duration, Instant};

use fs2::FileExt;
use tracing::debug;

use super::StateError;

/// Name of the lock file inside a state directory.
pub const LOCK_FILE: &str = ".lock";

/// An exclusive lock on one state directory.
#[derive(Debug)]
pub struct StateDirLock {
    path: PathBuf,
    file: Option<File>,
}

impl StateDirLock {
    /// Take the lock on `dir`, creating the directory if needed.
    ///
    /// # Errors
    ///
    /// - [`StateError::AlreadyLocked`] if another run holds it
    /// - [`StateError::LockFailed`] if the lock file cannot be opened or locked
    pub fn acquire(dir: &Path) -> Result<Self, StateError> {
        fs::create_dir_all(dir).map_err(|e| {
            StateError::LockFailed(format!("cannot create {}: {}", dir.display(), e))
        })?;

        let path = dir.join(LOCK_FILE);
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .map_err(|e| StateError::LockFailed(format!("cannot open {}: {}", path.display(), e)))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self {
                path,
                file: Some(file),
            }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => {
                Err(StateError::AlreadyLocked(dir.to_path_buf()))
            }
            Err(e) => Err(StateError::LockFailed(e.to_string())),
        }
    }

    /// Like [`acquire`](Self::acquire), returning `None` if already held.
    pub fn try_acquire(dir: &Path) -> Result<Option<Self>, StateError> {
        match Self::acquire(dir) {
            Ok(lock) => Ok(Some(lock)),
            Err(StateError::AlreadyLocked(_)) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Retry [`acquire`](Self::acquire) every `poll_interval` until `timeout` passes.
    pub fn wait(dir: &Path, poll_interval: Duration, timeout: Duration) -> Result<Self, StateError> {
        let start = Instant::now();
        loop {
            if let Some(lock) = Self::try_acquire(dir)? {
                return Ok(lock);
            }
            let waited = start.elapsed();
            if waited >= timeout {
                return Err(StateError::AlreadyLocked(dir.to_path_buf()));
            }
            debug!(dir = %dir.display(), "state directory busy, retrying");
            thread::sleep(poll_interval.min(timeout - waited));
        }
    }

    pub fn is_held(&self) -> bool {
        self.file.is_some()
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Release before the guard goes out of scope.
    pub fn release(&mut self) -> Result<(), StateError> {
        if let Some(file) = self.file.take() {
            file.unlock()
                .map_err(|e| StateError::LockFailed(e.to_string()))?;
        }
        Ok(())
    }
}

impl Drop for StateDirLock {
    fn drop(&mut self) {
        if let Some(file) = self.file.take() {
            let _ = file.unlock();
        }
    }
}
