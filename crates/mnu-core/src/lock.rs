//! Advisory single-instance locks.
//!
//! Each coordination domain (the main application, any secondary launch mode)
//! owns one lock file in the state directory. The lock is a non-blocking
//! exclusive `flock(2)`: it conflicts with every other open file description,
//! including a second open of the same file from the same process, and the
//! kernel drops it when the descriptor closes, so a crashed holder never
//! leaves a stale lock behind.

use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};

use nix::errno::Errno;
use nix::fcntl::{Flock, FlockArg};

use crate::error::{Error, Result};
use crate::state::StateDir;

/// Lock file name for the main application.
pub const APP_LOCK_NAME: &str = "mnu.lock";

/// A held advisory lock. Dropping it releases the lock.
pub struct AppLock {
    path: PathBuf,
    handle: Flock<File>,
}

impl std::fmt::Debug for AppLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppLock").field("path", &self.path).finish()
    }
}

impl AppLock {
    /// Try to take the lock named `name` inside the state directory.
    ///
    /// # Errors
    ///
    /// Returns [`Error::LockContention`] if another handle holds the lock, or
    /// an I/O error if the lock file cannot be opened.
    pub fn acquire(state: &StateDir, name: &str) -> Result<Self> {
        Self::acquire_path(state.lock_file(name))
    }

    /// Try to take the lock on an explicit file path.
    ///
    /// # Errors
    ///
    /// Same as [`AppLock::acquire`].
    pub fn acquire_path(path: impl Into<PathBuf>) -> Result<Self> {
        let path = path.into();
        let file = open_lock_file(&path)?;

        match Flock::lock(file, FlockArg::LockExclusiveNonblock) {
            Ok(handle) => {
                tracing::debug!(path = %path.display(), "Acquired lock");
                Ok(Self { path, handle })
            }
            Err((_, Errno::EWOULDBLOCK)) => {
                tracing::debug!(path = %path.display(), "Lock is held elsewhere");
                Err(Error::LockContention { path })
            }
            Err((_, errno)) => Err(Error::Io(std::io::Error::from(errno))),
        }
    }

    /// Path of the lock file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Unlock and close the lock file.
    ///
    /// # Errors
    ///
    /// Returns an I/O error if the unlock call fails. The descriptor is
    /// closed either way, which also drops the lock.
    pub fn release(self) -> Result<()> {
        let path = self.path;
        match self.handle.unlock() {
            Ok(file) => {
                drop(file);
                tracing::debug!(path = %path.display(), "Released lock");
                Ok(())
            }
            Err((_, errno)) => Err(Error::Io(std::io::Error::from(errno))),
        }
    }
}

fn open_lock_file(path: &Path) -> Result<File> {
    use std::os::unix::fs::OpenOptionsExt;

    OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .mode(0o600)
        .open(path)
        .map_err(Error::from)
}
