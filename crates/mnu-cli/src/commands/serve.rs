//! Serve command implementation.

use anyhow::Result;
use mnu_core::serve::{BackendCommand, ServiceAdvertiser};

/// Run the shared vault backend, or report the one already running.
pub async fn run() -> Result<()> {
    let (state, config) = super::load_state()?;
    let advertiser = ServiceAdvertiser::new(state, BackendCommand::bitwarden(config.vault.backend));

    if let Some(url) = advertiser.find_advertised().await {
        println!("{url}");
        return Ok(());
    }

    advertiser
        .run_advertiser(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::warn!("Failed to listen for Ctrl+C: {}", e);
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}
