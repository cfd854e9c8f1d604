//! Error types for mnu.
//!
//! This module provides a unified error type for all mnu operations,
//! with specific error variants for different failure modes.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

/// A specialized `Result` type for mnu operations.
pub type Result<T> = std::result::Result<T, Error>;

/// The main error type for mnu.
#[derive(Error, Debug)]
pub enum Error {
    /// The per-user state directory cannot be resolved or created
    #[error("cannot prepare state directory: {0}")]
    StateDir(String),

    /// A pipe or private byte channel could not be created or opened
    #[error("channel error: {0}")]
    Channel(String),

    /// A child process failed to start
    #[error("failed to start {program}: {source}")]
    ProcessSpawn {
        /// Program that was being launched
        program: String,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// A spawned clearer never confirmed it took over the clipboard
    #[error("clipboard clearer failed to start: {0}")]
    ClearerFailed(String),

    /// A secret handed to the clipboard is not text
    #[error("secret is not valid UTF-8 text")]
    InvalidSecret,

    /// The clearer pointer file could not be persisted
    #[error("failed to persist clearer pointer '{}': {source}", path.display())]
    Pointer {
        /// Pointer file path
        path: PathBuf,
        /// Underlying OS error
        #[source]
        source: io::Error,
    },

    /// Another process already holds the named lock
    #[error("already running (lock '{}' is held)", path.display())]
    LockContention {
        /// Lock file path
        path: PathBuf,
    },

    /// The backend service never became healthy
    #[error("backend at {url} did not become ready within {secs} seconds")]
    ServiceTimeout {
        /// Base URL that was polled
        url: String,
        /// Overall deadline in seconds
        secs: u64,
    },

    /// The backend service failed outside of readiness polling
    #[error("backend error: {0}")]
    Backend(String),

    /// A live advertiser already owns the advertisement socket
    #[error("another process already advertises a backend on '{}'", path.display())]
    AlreadyAdvertised {
        /// Socket path
        path: PathBuf,
    },

    /// A clearer token is malformed
    #[error("invalid clearer token: {0}")]
    InvalidToken(String),

    /// Clipboard access failed
    #[error("clipboard error: {0}")]
    ClipboardError(String),

    /// Vault backend request failed
    #[error("vault error: {0}")]
    Vault(String),

    /// Requested field is absent from a vault item
    #[error("{field} not found for item '{id}'")]
    FieldNotFound {
        /// Field name (password, totp, username)
        field: &'static str,
        /// Item identifier
        id: String,
    },

    /// Configuration file error
    #[error("configuration error: {0}")]
    ConfigError(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),
}

impl Error {
    /// Returns whether this error means "another instance already holds the lock".
    ///
    /// Callers treat this as a clean, successful exit rather than a failure.
    #[must_use]
    pub const fn is_lock_contention(&self) -> bool {
        matches!(self, Self::LockContention { .. })
    }

    /// Process exit code for this error.
    #[must_use]
    pub const fn exit_code(&self) -> i32 {
        match self {
            Self::LockContention { .. } => 0,
            Self::InvalidToken(_) | Self::InvalidSecret | Self::ConfigError(_) => 2,
            _ => 1,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lock_contention_is_clean_exit() {
        let err = Error::LockContention {
            path: PathBuf::from("/tmp/mnu.lock"),
        };
        assert!(err.is_lock_contention());
        assert_eq!(err.exit_code(), 0);
        assert!(err.to_string().contains("mnu.lock"));
    }

    #[test]
    fn test_faults_are_non_zero() {
        assert_eq!(Error::Channel("pipe".into()).exit_code(), 1);
        assert_eq!(Error::InvalidToken("../x".into()).exit_code(), 2);
        assert_eq!(Error::InvalidSecret.exit_code(), 2);
        assert!(!Error::ClipboardError("x".into()).is_lock_contention());
    }
}
