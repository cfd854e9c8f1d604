//! Internal command for the clipboard clearer subprocess.
//!
//! Not user-facing. [`mnu_core::clipboard::ClipboardHandoff`] spawns
//! `mnu clear-clipboard <ttl> <token>` detached from the terminal, writes
//! the secret to its stdin and waits for the ready byte on its stdout.

use std::time::Duration;

use anyhow::{Context, Result};
use mnu_core::clipboard::{create_clipboard, parse_token, Clearer};
use mnu_core::state::StateDir;

use super::ClearClipboardArgs;

/// Run the clearer until its clipboard obligation is discharged.
///
/// # Errors
///
/// Returns an error if the token is malformed, the clipboard is unavailable
/// or the cancellation FIFO cannot be set up.
pub fn run_clear_clipboard(args: &ClearClipboardArgs) -> Result<()> {
    let token = parse_token(&args.token)?;
    let state = StateDir::resolve()?;
    let clipboard = create_clipboard().context("Failed to access clipboard in clearer process")?;

    let clearer = Clearer::new(state, token, Duration::from_secs(args.ttl), clipboard);
    clearer.run_signalling(std::io::stdin().lock(), std::io::stdout().lock())?;
    Ok(())
}
