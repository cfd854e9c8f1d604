//! # mnu Core Library
//!
//! `mnu-core` provides the core functionality for mnu, a terminal launcher
//! and password picker that never leaves secrets on the clipboard.
//!
//! ## Features
//!
//! - **Self-clearing clipboard**: every copied secret is wiped after a
//!   time-to-live, unless something newer replaced it first
//! - **Shared vault backend**: one `bw serve` per user, discovered over a
//!   Unix socket
//! - **Single instance**: advisory locks keep concurrent menus apart
//!
//! ## Modules
//!
//! - [`clipboard`] - Clipboard hand-off and the detached clearer
//! - [`config`] - Configuration management
//! - [`lock`] - Advisory singleton locks
//! - [`serve`] - Vault backend startup and advertisement
//! - [`state`] - Per-user state directory layout
//! - [`vault`] - Vault clients (REST API and CLI)
//!
//! ## Example
//!
//! ```rust,ignore
//! use mnu_core::clipboard::ClipboardHandoff;
//! use mnu_core::state::StateDir;
//!
//! let handoff = ClipboardHandoff::new(StateDir::resolve()?)?;
//! handoff.copy_text(Zeroizing::new("p@ss".into()), Duration::from_secs(15))?;
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::doc_markdown)]
#![allow(clippy::missing_const_for_fn)]
#![allow(clippy::must_use_candidate)]

#[cfg(not(unix))]
compile_error!("mnu relies on FIFOs, flock and Unix sockets and only builds on Unix");

pub mod clipboard;
pub mod config;
pub mod error;
pub mod lock;
pub mod serve;
pub mod state;
pub mod vault;

pub use error::{Error, Result};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
