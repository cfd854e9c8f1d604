//! Copy command implementation.

use std::io::Read;

use anyhow::{Context, Result};
use mnu_core::clipboard::ClipboardHandoff;
use zeroize::Zeroizing;

use super::CopyArgs;
use crate::ui::format_ttl;

/// Read a secret from stdin and hand it to the clipboard.
pub fn run(args: CopyArgs) -> Result<()> {
    let (state, config) = super::load_state()?;
    let ttl = args.clear_after.unwrap_or(config.clipboard.clear_after);

    let mut secret = Zeroizing::new(Vec::new());
    std::io::stdin()
        .read_to_end(&mut secret)
        .context("Failed to read secret from stdin")?;
    if !args.keep_newline {
        strip_newline(&mut secret);
    }

    let handoff = ClipboardHandoff::new(state)?;
    handoff.copy(secret, ttl)?;
    eprintln!("Copied to clipboard, clearing in {}", format_ttl(ttl));
    Ok(())
}

/// Drop one trailing `\n` or `\r\n`, as left by `echo` and editors.
fn strip_newline(secret: &mut Vec<u8>) {
    if secret.last() == Some(&b'\n') {
        secret.pop();
        if secret.last() == Some(&b'\r') {
            secret.pop();
        }
    }
}
