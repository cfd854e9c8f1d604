//! Vault command implementations: list, get and unlock.

use std::io::Read;

use anyhow::{bail, Context, Result};
use mnu_core::clipboard::ClipboardHandoff;
use mnu_core::config::Config;
use mnu_core::lock::{AppLock, APP_LOCK_NAME};
use mnu_core::serve::{BackendCommand, BackendProcess, ServiceAdvertiser};
use mnu_core::state::StateDir;
use mnu_core::vault::{ApiVault, CliVault, ItemField, VaultManager};
use zeroize::Zeroizing;

use super::{GetArgs, ListArgs};
use crate::ui::{format_ttl, print_items};

/// A vault client, plus the private backend it talks to when no shared one
/// was advertised. The backend stops when this is dropped.
struct OpenVault {
    vault: Box<dyn VaultManager>,
    _backend: Option<BackendProcess>,
}

async fn open_vault(state: &StateDir, config: &Config) -> Result<OpenVault> {
    if !config.vault.api_mode {
        return Ok(OpenVault {
            vault: Box::new(CliVault::new(config.vault.backend.clone())),
            _backend: None,
        });
    }

    let advertiser = ServiceAdvertiser::new(
        state.clone(),
        BackendCommand::bitwarden(config.vault.backend.clone()),
    );
    if let Some(url) = advertiser.find_advertised().await {
        tracing::debug!(url = %url, "Using advertised backend");
        return Ok(OpenVault {
            vault: Box::new(ApiVault::new(&url)?),
            _backend: None,
        });
    }

    tracing::info!("No running `mnu serve`; starting a private backend");
    let backend = advertiser.start().await?;
    Ok(OpenVault {
        vault: Box::new(ApiVault::new(backend.url())?),
        _backend: Some(backend),
    })
}

async fn ensure_unlocked(vault: &dyn VaultManager) -> Result<()> {
    if !vault.is_logged_in().await? {
        bail!("Vault is locked; run `mnu unlock` first");
    }
    Ok(())
}

/// List vault items.
pub async fn run_list(args: ListArgs) -> Result<()> {
    let (state, config) = super::load_state()?;
    let _lock = AppLock::acquire(&state, APP_LOCK_NAME)?;

    let open = open_vault(&state, &config).await?;
    ensure_unlocked(open.vault.as_ref()).await?;
    let items = open.vault.get_items().await?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&items)?);
    } else {
        print_items(&items);
    }
    Ok(())
}

/// Copy one field of a vault item to the clipboard.
pub async fn run_get(args: GetArgs) -> Result<()> {
    let (state, config) = super::load_state()?;
    let _lock = AppLock::acquire(&state, APP_LOCK_NAME)?;
    let field = ItemField::from(args.field);
    let ttl = args.clear_after.unwrap_or(config.clipboard.clear_after);

    let open = open_vault(&state, &config).await?;
    ensure_unlocked(open.vault.as_ref()).await?;
    let value = open.vault.get_field(field, &args.id).await?;

    ClipboardHandoff::new(state)?.copy_text(value, ttl)?;
    eprintln!("Copied {} to clipboard, clearing in {}", field, format_ttl(ttl));
    Ok(())
}

/// Unlock the vault with a master password read from stdin.
///
/// With the CLI backend the session key is printed for `BW_SESSION`.
pub async fn run_unlock() -> Result<()> {
    let (state, config) = super::load_state()?;

    let mut password = Zeroizing::new(String::new());
    std::io::stdin()
        .read_to_string(&mut password)
        .context("Failed to read master password from stdin")?;
    let trimmed = password.trim_end_matches(['\r', '\n']).len();
    password.truncate(trimmed);
    if password.is_empty() {
        bail!("No master password received on stdin");
    }

    let open = open_vault(&state, &config).await?;
    let session = open.vault.unlock(&password).await?;

    if config.vault.api_mode {
        eprintln!("Vault unlocked");
    } else {
        println!("{}", session.as_str());
    }
    Ok(())
}
