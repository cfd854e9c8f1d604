//! Copy a secret to the clipboard with a scheduled clear.
//!
//! A hand-off cancels whichever clearer the pointer file names, spawns a new
//! detached clearer (`<exe> clear-clipboard <ttl_seconds> <token>`), pipes it
//! the secret over stdin, waits for the clearer's ready byte on its stdout and
//! finally records the new token in the pointer file. Once the token is
//! recorded the clearer's FIFO exists, so the next hand-off can cancel it.
//!
//! The pointer file is a single-slot, last-writer-wins register: a stale
//! entry only makes the next cancellation a no-op.

use std::io::{Read, Write};
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::sync::mpsc;
use std::time::Duration;

use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::state::StateDir;

use super::cancel::send_cancel;
use super::clearer::{parse_token, READY_SIGNAL};

/// Subcommand the clearer process is started with.
pub const CLEAR_SUBCOMMAND: &str = "clear-clipboard";

/// Default bound on waiting for a clearer to confirm it owns the clipboard.
pub const READY_TIMEOUT: Duration = Duration::from_secs(5);

/// Hands secrets to detached clearer processes.
#[derive(Debug, Clone)]
pub struct ClipboardHandoff {
    state: StateDir,
    program: PathBuf,
    ready_timeout: Duration,
}

impl ClipboardHandoff {
    /// Hand-off that re-executes the current binary as the clearer.
    ///
    /// # Errors
    ///
    /// Returns an error if the current executable cannot be located.
    pub fn new(state: StateDir) -> Result<Self> {
        let program = std::env::current_exe().map_err(|e| Error::ProcessSpawn {
            program: "current executable".into(),
            source: e,
        })?;
        Ok(Self::with_program(state, program))
    }

    /// Hand-off that launches `program` as the clearer.
    pub fn with_program(state: StateDir, program: impl Into<PathBuf>) -> Self {
        Self {
            state,
            program: program.into(),
            ready_timeout: READY_TIMEOUT,
        }
    }

    /// Bound on how long [`ClipboardHandoff::copy`] waits for the clearer.
    #[must_use]
    pub fn with_ready_timeout(mut self, timeout: Duration) -> Self {
        self.ready_timeout = timeout;
        self
    }

    /// Put `secret` on the clipboard and schedule a clear after `ttl`.
    ///
    /// Returns once the clearer has consumed the secret, published its
    /// cancellation FIFO and taken over the clipboard; does not wait for the
    /// clear. The secret buffer is zeroed on every return path.
    ///
    /// # Errors
    ///
    /// - [`Error::InvalidSecret`] if `secret` is not UTF-8 text
    /// - [`Error::ProcessSpawn`] if the clearer cannot be started
    /// - [`Error::Channel`] if the secret cannot be written to its stdin
    /// - [`Error::ClearerFailed`] if the clearer exits or stalls before
    ///   confirming it owns the clipboard
    /// - [`Error::Pointer`] if the new token cannot be persisted
    pub fn copy(&self, secret: Zeroizing<Vec<u8>>, ttl: Duration) -> Result<Uuid> {
        if std::str::from_utf8(&secret).is_err() {
            return Err(Error::InvalidSecret);
        }

        if let Some(previous) = self.current_token() {
            self.cancel(&previous);
        }

        let token = Uuid::new_v4();
        let mut child = self.spawn_clearer(&secret, ttl, &token)?;
        if let Err(e) = self.await_ready(&mut child) {
            let _ = child.kill();
            let _ = child.wait();
            return Err(e);
        }
        drop(secret);
        reap_in_background(child);

        self.write_pointer(&token)?;
        tracing::info!(token = %token, ttl_secs = ttl_arg(ttl), "Handed secret to clearer");
        Ok(token)
    }

    /// Text convenience wrapper around [`ClipboardHandoff::copy`].
    ///
    /// # Errors
    ///
    /// Same as [`ClipboardHandoff::copy`].
    pub fn copy_text(&self, text: Zeroizing<String>, ttl: Duration) -> Result<Uuid> {
        let mut text = text;
        let bytes = Zeroizing::new(std::mem::take(&mut *text).into_bytes());
        self.copy(bytes, ttl)
    }

    /// Token of the most recent hand-off, if the pointer file names one.
    pub fn current_token(&self) -> Option<Uuid> {
        let raw = std::fs::read_to_string(self.state.pointer_file()).ok()?;
        match parse_token(&raw) {
            Ok(token) => Some(token),
            Err(e) => {
                tracing::debug!("Ignoring unreadable clearer pointer: {}", e);
                None
            }
        }
    }

    /// Ask the clearer with `token` to stop without clearing.
    ///
    /// Best-effort and non-blocking; returns whether the signal was written.
    pub fn cancel(&self, token: &Uuid) -> bool {
        send_cancel(&self.state.clearer_fifo(token))
    }

    fn spawn_clearer(&self, secret: &[u8], ttl: Duration, token: &Uuid) -> Result<Child> {
        let mut cmd = Command::new(&self.program);
        cmd.arg(CLEAR_SUBCOMMAND)
            .arg(ttl_arg(ttl).to_string())
            .arg(token.to_string())
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::null());

        // New session: the clearer outlives this process and its terminal.
        #[allow(unsafe_code)]
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid()
                    .map(drop)
                    .map_err(std::io::Error::from)
            });
        }

        let mut child = cmd.spawn().map_err(|e| Error::ProcessSpawn {
            program: self.program.display().to_string(),
            source: e,
        })?;
        tracing::debug!(pid = child.id(), token = %token, "Clearer process spawned");

        let Some(mut stdin) = child.stdin.take() else {
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Channel("failed to get stdin pipe for clearer".into()));
        };

        if let Err(e) = stdin.write_all(secret) {
            drop(stdin);
            let _ = child.kill();
            let _ = child.wait();
            return Err(Error::Channel(format!(
                "failed to write secret to clearer: {e}"
            )));
        }
        drop(stdin);

        Ok(child)
    }

    /// Wait for the clearer's ready byte on its stdout.
    fn await_ready(&self, child: &mut Child) -> Result<()> {
        let Some(mut stdout) = child.stdout.take() else {
            return Err(Error::Channel("failed to get stdout pipe for clearer".into()));
        };

        let (tx, rx) = mpsc::channel();
        std::thread::Builder::new()
            .name("clearer-ready".into())
            .spawn(move || {
                let mut buf = [0u8; 1];
                let _ = tx.send(stdout.read(&mut buf).map(|n| n == 1 && buf[0] == READY_SIGNAL));
            })
            .map_err(|e| Error::Channel(format!("failed to start ready listener: {e}")))?;

        match rx.recv_timeout(self.ready_timeout) {
            Ok(Ok(true)) => {
                tracing::debug!(pid = child.id(), "Clearer ready");
                Ok(())
            }
            Ok(Ok(false)) => Err(Error::ClearerFailed(
                "clearer exited before taking the clipboard".into(),
            )),
            Ok(Err(e)) => Err(Error::ClearerFailed(format!("failed to read readiness: {e}"))),
            Err(_) => Err(Error::ClearerFailed(format!(
                "no confirmation within {} ms",
                self.ready_timeout.as_millis()
            ))),
        }
    }

    fn write_pointer(&self, token: &Uuid) -> Result<()> {
        let path = self.state.pointer_file();
        let temp_path = self
            .state
            .path()
            .join(format!(".{}.{token}.tmp", crate::state::POINTER_FILE_NAME));

        let written = std::fs::write(&temp_path, token.to_string())
            .and_then(|()| std::fs::rename(&temp_path, &path));

        written.map_err(|source| {
            let _ = std::fs::remove_file(&temp_path);
            Error::Pointer { path, source }
        })
    }
}

/// Whole seconds passed to the clearer; a partial second counts as one.
fn ttl_arg(ttl: Duration) -> u64 {
    ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0)
}

fn reap_in_background(mut child: Child) {
    let pid = child.id();
    let spawned = std::thread::Builder::new()
        .name("clearer-reaper".into())
        .spawn(move || match child.wait() {
            Ok(status) => tracing::debug!(pid, %status, "Clearer exited"),
            Err(e) => tracing::debug!(pid, "Failed to wait for clearer: {}", e),
        });

    if let Err(e) = spawned {
        tracing::debug!("Could not start reaper thread: {}", e);
    }
}
