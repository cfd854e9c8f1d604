//! mnu CLI - Password picker with a self-clearing clipboard
//!
//! mnu fetches secrets from a Bitwarden vault and hands them to the
//! clipboard for a limited time. A detached clearer wipes the clipboard
//! afterwards, unless something newer was copied in the meantime.
//!
//! ## Quick Start
//!
//! ```bash
//! # Share one vault backend between all invocations
//! mnu serve &
//!
//! # Copy a password, cleared after 15 seconds
//! mnu get password 5b3c...
//!
//! # Copy anything from stdin
//! printf 'p@ss' | mnu copy --clear-after 30s
//! ```

#![allow(clippy::doc_markdown)]
#![allow(clippy::uninlined_format_args)]

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;

mod commands;
pub mod ui;

use commands::{Cli, Command};

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.debug);

    let result = match cli.command {
        Command::Serve => commands::serve::run().await,
        Command::Copy(args) => commands::copy::run(args),
        Command::List(args) => commands::vault::run_list(args).await,
        Command::Get(args) => commands::vault::run_get(args).await,
        Command::Unlock => commands::vault::run_unlock().await,
        Command::ClearClipboard(args) => commands::internal::run_clear_clipboard(&args),
    };

    exit_code(result)
}

fn exit_code(result: Result<()>) -> ExitCode {
    let Err(err) = result else {
        return ExitCode::SUCCESS;
    };

    match err.downcast_ref::<mnu_core::Error>() {
        Some(core) if core.is_lock_contention() => {
            eprintln!("mnu is already running");
            ExitCode::SUCCESS
        }
        Some(core) => {
            eprintln!("Error: {:#}", err);
            ExitCode::from(u8::try_from(core.exit_code()).unwrap_or(1))
        }
        None => {
            eprintln!("Error: {:#}", err);
            ExitCode::FAILURE
        }
    }
}

fn init_logging(debug: bool) {
    use tracing_subscriber::{fmt, prelude::*, EnvFilter};

    let default = if debug {
        "debug"
    } else {
        "warn,mnu=info,mnu_core=info"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::registry()
        .with(
            fmt::layer()
                .with_target(false)
                .without_time()
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
}
