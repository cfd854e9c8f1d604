//! Named-pipe cancellation channel between hand-offs and clearers.
//!
//! A clearer owns one FIFO named after its token. Any later hand-off cancels
//! it by writing a single byte with a non-blocking open. The FIFO is staged
//! under a private name, opened for reading and held open by a keep-alive
//! writer, and only then renamed into place: whoever can see the public path
//! always finds a reader, and the reader never sees end-of-file from an
//! absent writer.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::os::fd::AsRawFd;
use std::os::unix::fs::{FileTypeExt, OpenOptionsExt};
use std::path::{Path, PathBuf};
use std::sync::mpsc;

use nix::fcntl::{fcntl, FcntlArg, OFlag};
use nix::sys::stat::Mode;

use crate::error::{Error, Result};

/// Byte written to a clearer's FIFO to cancel it.
pub const CANCEL_SENTINEL: u8 = b'c';

/// Receiving end of a clearer's cancellation FIFO.
///
/// Dropping the channel wakes the listener thread and removes the FIFO.
pub struct CancelChannel {
    path: PathBuf,
    reader: Option<File>,
    keepalive: File,
}

impl CancelChannel {
    /// Create the FIFO at `path` with a reader already attached.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Channel`] if the FIFO cannot be created or opened.
    pub fn create(path: &Path) -> Result<Self> {
        let staging = path.with_extension("partial");
        let _ = std::fs::remove_file(&staging);

        nix::unistd::mkfifo(&staging, Mode::S_IRUSR | Mode::S_IWUSR).map_err(|e| {
            Error::Channel(format!("failed to create FIFO {}: {e}", staging.display()))
        })?;

        match Self::open_and_publish(&staging, path) {
            Ok(channel) => {
                tracing::debug!(path = %path.display(), "Cancellation FIFO ready");
                Ok(channel)
            }
            Err(e) => {
                let _ = std::fs::remove_file(&staging);
                Err(e)
            }
        }
    }

    fn open_and_publish(staging: &Path, path: &Path) -> Result<Self> {
        let channel_err =
            |what: &str, e: std::io::Error| Error::Channel(format!("failed to {what}: {e}"));

        let reader = OpenOptions::new()
            .read(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(staging)
            .map_err(|e| channel_err("open FIFO for reading", e))?;

        let keepalive = OpenOptions::new()
            .write(true)
            .custom_flags(libc::O_NONBLOCK)
            .open(staging)
            .map_err(|e| channel_err("open FIFO keep-alive writer", e))?;

        // Reads must block until a cancel byte arrives.
        fcntl(reader.as_raw_fd(), FcntlArg::F_SETFL(OFlag::empty()))
            .map_err(|e| channel_err("make FIFO reader blocking", e.into()))?;

        std::fs::rename(staging, path).map_err(|e| channel_err("publish FIFO", e))?;

        Ok(Self {
            path: path.to_path_buf(),
            reader: Some(reader),
            keepalive,
        })
    }

    /// Public path of the FIFO.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Start a thread that reports the first byte read from the FIFO.
    ///
    /// The returned receiver yields `()` once a cancel arrives. If the read
    /// fails the sender is dropped without sending.
    pub fn listen(&mut self) -> mpsc::Receiver<()> {
        let (tx, rx) = mpsc::channel();
        let Some(mut reader) = self.reader.take() else {
            return rx;
        };

        let spawned = std::thread::Builder::new()
            .name("clearer-cancel".into())
            .spawn(move || {
                let mut buf = [0u8; 1];
                match reader.read(&mut buf) {
                    Ok(_) => {
                        let _ = tx.send(());
                    }
                    Err(e) => tracing::warn!("Error reading cancellation FIFO: {}", e),
                }
            });

        if let Err(e) = spawned {
            tracing::warn!("Could not start cancellation listener: {}", e);
        }
        rx
    }
}

impl Drop for CancelChannel {
    fn drop(&mut self) {
        let _ = self.keepalive.write_all(&[CANCEL_SENTINEL]);
        match std::fs::remove_file(&self.path) {
            Ok(()) => tracing::debug!(path = %self.path.display(), "Removed cancellation FIFO"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => tracing::warn!("Failed to remove {}: {}", self.path.display(), e),
        }
    }
}

/// Send a cancellation byte to the FIFO at `path`.
///
/// Never blocks: the open is non-blocking and fails immediately when no
/// clearer is listening. Returns whether the byte was written. A `true`
/// result does not guarantee the clearer acted on it.
pub fn send_cancel(path: &Path) -> bool {
    match std::fs::symlink_metadata(path) {
        Ok(meta) if meta.file_type().is_fifo() => {}
        Ok(_) => {
            tracing::warn!("Ignoring non-FIFO at {}", path.display());
            return false;
        }
        Err(_) => return false,
    }

    let sent = OpenOptions::new()
        .write(true)
        .custom_flags(libc::O_NONBLOCK)
        .open(path)
        .and_then(|mut fifo| fifo.write_all(&[CANCEL_SENTINEL]));

    match sent {
        Ok(()) => {
            tracing::debug!(path = %path.display(), "Sent clearer cancellation");
            true
        }
        Err(e) => {
            tracing::debug!(path = %path.display(), "Cancellation not delivered: {}", e);
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn test_cancel_reaches_listener() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("clipboard_clearer_test.fifo");

        let mut channel = CancelChannel::create(&path).expect("create FIFO");
        assert!(path.exists());
        assert!(!path.with_extension("partial").exists());

        let rx = channel.listen();
        assert!(send_cancel(&path));
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
    }

    #[test]
    fn test_listener_waits_without_writer() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("idle.fifo");

        let mut channel = CancelChannel::create(&path).unwrap();
        let rx = channel.listen();
        assert!(matches!(
            rx.recv_timeout(Duration::from_millis(100)),
            Err(mpsc::RecvTimeoutError::Timeout)
        ));
    }

    #[test]
    fn test_drop_removes_fifo() {
        let temp = tempfile::tempdir().unwrap();
        let path = temp.path().join("dropped.fifo");

        let mut channel = CancelChannel::create(&path).unwrap();
        let _rx = channel.listen();
        drop(channel);

        assert!(!path.exists());
        assert!(!send_cancel(&path));
    }

    #[test]
    fn test_send_cancel_without_fifo_is_noop() {
        let temp = tempfile::tempdir().unwrap();
        assert!(!send_cancel(&temp.path().join("missing.fifo")));

        let regular = temp.path().join("regular.fifo");
        std::fs::write(&regular, b"").unwrap();
        assert!(!send_cancel(&regular));
        assert_eq!(std::fs::read(&regular).unwrap(), b"");
    }
}
