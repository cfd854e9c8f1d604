//! Self-clearing clipboard hand-off.
//!
//! This module puts secrets on the system clipboard for a bounded time:
//!
//! - [`ClipboardHandoff`] is called by the application. It cancels the
//!   previous clearer and spawns a new one.
//! - [`Clearer`] runs inside the detached `clear-clipboard` process.
//! - [`cancel`] holds the FIFO protocol that connects the two.
//!
//! ## Usage
//!
//! ```rust,ignore
//! // Application side
//! let handoff = ClipboardHandoff::new(StateDir::resolve()?)?;
//! handoff.copy_text(Zeroizing::new(password), Duration::from_secs(15))?;
//!
//! // Inside `mnu clear-clipboard 15 <token>`
//! let clearer = Clearer::new(state, token, ttl, create_clipboard()?);
//! clearer.run_signalling(std::io::stdin().lock(), std::io::stdout().lock())?;
//! ```

pub mod access;
pub mod cancel;
pub mod clearer;
pub mod handoff;

pub use access::{create_clipboard, ClipboardAccess, MemoryClipboard, NativeClipboard};
pub use cancel::{send_cancel, CancelChannel, CANCEL_SENTINEL};
pub use clearer::{
    parse_token, ClearOutcome, Clearer, ClearerSession, ClearerState, SecretDigest, READY_SIGNAL,
};
pub use handoff::{ClipboardHandoff, CLEAR_SUBCOMMAND, READY_TIMEOUT};
