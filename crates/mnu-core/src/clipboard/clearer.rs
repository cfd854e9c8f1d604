//! The detached clearer.
//!
//! One clearer process exists per hand-off. It puts the secret on the
//! clipboard, confirms with [`READY_SIGNAL`] on its ready stream, then waits
//! for whichever comes first: its time-to-live running out, or a cancellation
//! byte on its FIFO. On timeout it only wipes the clipboard if it still holds
//! the secret it wrote.
//!
//! ```text
//! Starting ──► CancelWait ──► Cleared   (timer; wiped or superseded)
//!     │             └───────► Cancelled (cancel byte)
//!     └──────────────────────► Faulted  (any I/O error)
//! ```

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::mpsc::RecvTimeoutError;
use std::time::{Duration, Instant};

use sha2::{Digest, Sha256};
use uuid::Uuid;
use zeroize::Zeroizing;

use crate::error::{Error, Result};
use crate::state::StateDir;

use super::access::ClipboardAccess;
use super::cancel::CancelChannel;

/// Byte a clearer writes once its FIFO exists and the secret is on the clipboard.
pub const READY_SIGNAL: u8 = b'r';

/// SHA-256 digest of clipboard text, used for the provenance check.
#[derive(Clone, Copy, PartialEq, Eq)]
pub struct SecretDigest([u8; 32]);

impl SecretDigest {
    /// Digest of `bytes`.
    pub fn of(bytes: &[u8]) -> Self {
        Self(Sha256::digest(bytes).into())
    }
}

impl std::fmt::Debug for SecretDigest {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretDigest(..)")
    }
}

/// Lifecycle states of a clearer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearerState {
    /// Reading the secret and preparing the FIFO
    Starting,
    /// Secret is on the clipboard; racing timer against cancel
    CancelWait,
    /// Time-to-live elapsed and the obligation is discharged
    Cleared,
    /// A newer hand-off cancelled this one
    Cancelled,
    /// An I/O fault ended the clearer
    Faulted,
}

impl ClearerState {
    /// Whether no further transition is possible.
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Cleared | Self::Cancelled | Self::Faulted)
    }
}

/// How a clearer finished without a fault.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClearOutcome {
    /// The timer fired and the clipboard still held the secret; it was wiped.
    Wiped,
    /// The timer fired but the clipboard had been overwritten; left untouched.
    Superseded,
    /// A cancellation arrived before the timer.
    Cancelled,
}

impl ClearOutcome {
    /// Terminal state this outcome corresponds to.
    pub const fn state(self) -> ClearerState {
        match self {
            Self::Wiped | Self::Superseded => ClearerState::Cleared,
            Self::Cancelled => ClearerState::Cancelled,
        }
    }
}

/// Bookkeeping for one hand-off, owned by its clearer.
#[derive(Debug)]
pub struct ClearerSession {
    /// Correlation token shared with the pointer file
    pub token: Uuid,
    /// Cancellation FIFO path
    pub channel_path: PathBuf,
    /// When the clipboard is due to be cleared
    pub deadline: Instant,
    /// Digest of the secret at hand-off time
    pub original_digest: SecretDigest,
}

/// Parse a clearer token received on the command line.
///
/// Only UUIDs are accepted, so a token can never escape the state directory
/// when it is turned into a FIFO path.
///
/// # Errors
///
/// Returns [`Error::InvalidToken`] for anything that is not a UUID.
pub fn parse_token(raw: &str) -> Result<Uuid> {
    Uuid::parse_str(raw.trim()).map_err(|_| Error::InvalidToken(raw.to_string()))
}

/// Drives a single hand-off from clipboard write to clear.
pub struct Clearer<C: ClipboardAccess> {
    state_dir: StateDir,
    token: Uuid,
    ttl: Duration,
    clipboard: C,
    state: ClearerState,
}

impl<C: ClipboardAccess> Clearer<C> {
    /// Create a clearer for `token` that wipes after `ttl`.
    pub fn new(state_dir: StateDir, token: Uuid, ttl: Duration, clipboard: C) -> Self {
        Self {
            state_dir,
            token,
            ttl,
            clipboard,
            state: ClearerState::Starting,
        }
    }

    /// Run the clearer to a terminal state without reporting readiness.
    ///
    /// # Errors
    ///
    /// Same as [`Clearer::run_signalling`].
    pub fn run(self, input: impl Read) -> Result<ClearOutcome> {
        self.run_signalling(input, std::io::sink())
    }

    /// Run the clearer to a terminal state.
    ///
    /// `input` is read to end-of-stream and holds the secret. [`READY_SIGNAL`]
    /// is written to `ready` once the cancellation FIFO is published and the
    /// clipboard holds the secret. The FIFO is removed on every exit path.
    ///
    /// # Errors
    ///
    /// Returns an error (the `Faulted` state) if reading the secret, creating
    /// the FIFO or accessing the clipboard fails.
    pub fn run_signalling(mut self, input: impl Read, ready: impl Write) -> Result<ClearOutcome> {
        match self.drive(input, ready) {
            Ok(outcome) => {
                self.transition(outcome.state());
                tracing::info!(token = %self.token, ?outcome, "Clearer finished");
                Ok(outcome)
            }
            Err(e) => {
                self.transition(ClearerState::Faulted);
                tracing::error!(token = %self.token, "Clearer faulted: {}", e);
                Err(e)
            }
        }
    }

    fn drive(&mut self, mut input: impl Read, mut ready: impl Write) -> Result<ClearOutcome> {
        let mut secret = Zeroizing::new(Vec::new());
        input
            .read_to_end(&mut secret)
            .map_err(|e| Error::Channel(format!("failed to read secret: {e}")))?;
        let text = std::str::from_utf8(&secret).map_err(|_| Error::InvalidSecret)?;

        let channel_path = self.state_dir.clearer_fifo(&self.token);
        let mut channel = CancelChannel::create(&channel_path)?;

        self.clipboard.write_text(text)?;
        let session = ClearerSession {
            token: self.token,
            channel_path,
            deadline: Instant::now() + self.ttl,
            original_digest: SecretDigest::of(&secret),
        };
        tracing::debug!(
            token = %session.token,
            bytes = secret.len(),
            ttl_secs = self.ttl.as_secs(),
            "Secret placed on clipboard"
        );
        drop(secret);

        if let Err(e) = ready.write_all(&[READY_SIGNAL]).and_then(|()| ready.flush()) {
            tracing::debug!("Could not report readiness: {}", e);
        }
        drop(ready);

        self.transition(ClearerState::CancelWait);
        let cancelled = channel.listen();
        let outcome = match cancelled.recv_timeout(self.ttl) {
            Ok(()) => ClearOutcome::Cancelled,
            Err(RecvTimeoutError::Timeout) => self.clear_if_unchanged(&session)?,
            Err(RecvTimeoutError::Disconnected) => {
                // Listener died; the timer alone decides.
                std::thread::sleep(session.deadline.saturating_duration_since(Instant::now()));
                self.clear_if_unchanged(&session)?
            }
        };

        drop(channel);
        Ok(outcome)
    }

    fn clear_if_unchanged(&mut self, session: &ClearerSession) -> Result<ClearOutcome> {
        let current = self.clipboard.read_text()?;
        let unchanged = current
            .as_ref()
            .is_some_and(|text| SecretDigest::of(text.as_bytes()) == session.original_digest);

        if unchanged {
            self.clipboard.write_text("")?;
            Ok(ClearOutcome::Wiped)
        } else {
            tracing::info!(token = %session.token, "Clipboard content changed; skipping clear");
            Ok(ClearOutcome::Superseded)
        }
    }

    fn transition(&mut self, next: ClearerState) {
        tracing::debug!(token = %self.token, from = ?self.state, to = ?next, "Clearer transition");
        self.state = next;
    }
}
