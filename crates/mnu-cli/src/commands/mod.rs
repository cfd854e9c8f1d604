//! CLI command definitions and handlers.

use std::time::Duration;

use clap::{Parser, Subcommand, ValueEnum};
use mnu_core::config::{parse_duration, Config};
use mnu_core::state::StateDir;
use mnu_core::vault::ItemField;

pub mod copy;
pub mod internal;
pub mod serve;
pub mod vault;

/// Resolve the state directory and load configuration from it.
///
/// A missing config file is created with defaults; a broken one is an error.
pub fn load_state() -> anyhow::Result<(StateDir, Config)> {
    let state = StateDir::resolve()?;
    let config = Config::load(&state)?;
    Ok((state, config))
}

/// mnu - Password picker with a self-clearing clipboard
#[derive(Parser)]
#[command(name = "mnu")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable debug logging
    #[arg(long, global = true)]
    pub debug: bool,

    /// The command to execute
    #[command(subcommand)]
    pub command: Command,
}

/// Available commands
#[derive(Subcommand)]
pub enum Command {
    /// Run the shared vault backend and advertise it to other invocations
    Serve,

    /// Copy a secret read from stdin, clearing it later
    Copy(CopyArgs),

    /// List vault items
    List(ListArgs),

    /// Copy a field of a vault item, clearing it later
    Get(GetArgs),

    /// Unlock the vault with a master password read from stdin
    Unlock,

    /// Internal: clear the clipboard after a delay (spawned by copy/get)
    #[command(name = "clear-clipboard", hide = true)]
    ClearClipboard(ClearClipboardArgs),
}

/// Arguments for the copy command
#[derive(Parser)]
pub struct CopyArgs {
    /// Clear the clipboard after this long (e.g., 15s, 2m)
    #[arg(short = 't', long, value_parser = parse_clear_after)]
    pub clear_after: Option<Duration>,

    /// Keep a trailing newline from stdin
    #[arg(long)]
    pub keep_newline: bool,
}

/// Arguments for the list command
#[derive(Parser)]
pub struct ListArgs {
    /// Output in JSON format
    #[arg(long)]
    pub json: bool,
}

/// Item fields that can be copied
#[derive(Clone, Copy, ValueEnum)]
pub enum FieldArg {
    /// Login password
    Password,
    /// Current TOTP code
    Totp,
    /// Login username
    Username,
}

impl From<FieldArg> for ItemField {
    fn from(field: FieldArg) -> Self {
        match field {
            FieldArg::Password => Self::Password,
            FieldArg::Totp => Self::Totp,
            FieldArg::Username => Self::Username,
        }
    }
}

/// Arguments for the get command
#[derive(Parser)]
pub struct GetArgs {
    /// Field to copy
    #[arg(value_enum)]
    pub field: FieldArg,

    /// Vault item ID
    pub id: String,

    /// Clear the clipboard after this long (e.g., 15s, 2m)
    #[arg(short = 't', long, value_parser = parse_clear_after)]
    pub clear_after: Option<Duration>,
}

/// Arguments for the internal clear-clipboard command
#[derive(Parser)]
pub struct ClearClipboardArgs {
    /// Seconds until the clipboard is cleared
    pub ttl: u64,

    /// Token naming this clearer's cancellation FIFO
    pub token: String,
}

fn parse_clear_after(s: &str) -> Result<Duration, String> {
    parse_duration(s).ok_or_else(|| format!("invalid duration '{s}' (use e.g. 15s, 2m, 1h)"))
}
