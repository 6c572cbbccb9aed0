//! Send command
//!
//! Runs the sender on a tokio runtime until it finishes or is interrupted.

use eyre::{Context, Result};
use log::info;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::config::Config;
use crate::sender::Sender;
use crate::vent;

/// Run the send command
pub fn run(config: &Config) -> Result<()> {
    let sender_config = config.sender.validate().context("Invalid sender configuration")?;
    let logs = vent::from_config(&config.vent).context("Failed to set up the vent")?;
    let sender = Sender::with_http_client(sender_config, Arc::new(logs)).context("Failed to initialize the sender")?;

    let rt = tokio::runtime::Runtime::new().context("Failed to create tokio runtime")?;
    rt.block_on(async move {
        let cancel = CancellationToken::new();
        tokio::spawn(cancel_on_signal(cancel.clone()));
        sender.run(cancel).await
    })
    .context("Sender failed")?;

    Ok(())
}

/// Cancel on Ctrl-C, and on SIGTERM where available
async fn cancel_on_signal(cancel: CancellationToken) {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};
        match signal(SignalKind::terminate()) {
            Ok(mut term) => {
                tokio::select! {
                    _ = tokio::signal::ctrl_c() => info!("Received Ctrl-C, stopping"),
                    _ = term.recv() => info!("Received SIGTERM, stopping"),
                }
            }
            Err(e) => {
                log::warn!("Cannot listen for SIGTERM: {}", e);
                let _ = tokio::signal::ctrl_c().await;
                info!("Received Ctrl-C, stopping");
            }
        }
    }
    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
        info!("Received Ctrl-C, stopping");
    }
    cancel.cancel();
}
