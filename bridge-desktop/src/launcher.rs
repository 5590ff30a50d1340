//! System browser launcher

use async_trait::async_trait;
use bridge_traits::{
    error::{BridgeError, Result},
    launcher::UrlLauncher,
};
use tracing::{debug, warn};

/// Opens URLs with the platform's default handler (`open`, `xdg-open`,
/// `start`).
#[derive(Debug, Default, Clone)]
pub struct SystemUrlLauncher;

impl SystemUrlLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl UrlLauncher for SystemUrlLauncher {
    async fn open(&self, url: &str) -> Result<()> {
        let target = url.to_string();

        // `open::that` blocks until the helper process has been spawned.
        let outcome = tokio::task::spawn_blocking(move || open::that(target))
            .await
            .map_err(|e| BridgeError::OperationFailed(format!("Launcher task failed: {}", e)))?;

        match outcome {
            Ok(()) => {
                debug!("Handed URL to system browser");
                Ok(())
            }
            Err(e) => {
                warn!(error = %e, "Failed to open browser");
                Err(BridgeError::NotAvailable(format!(
                    "No browser could be launched: {}",
                    e
                )))
            }
        }
    }
}
