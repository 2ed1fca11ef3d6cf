use std::sync::Arc;

use anyhow::{Context, Result};
use log::{info, warn};

use crate::platform::Clipboard;

/// Value the external automation looks for before letting the target app
/// open without redirecting back here.
pub const PASS_TOKEN: &str = "PASS_OPEN";

/// Loop-breaking token in the shared clipboard.
///
/// The automation reads and clears this slot on its own schedule, so the
/// state here is advisory: always re-read instead of remembering what was
/// written.
#[derive(Clone)]
pub struct HandshakeToken {
    clipboard: Arc<dyn Clipboard>,
}

impl HandshakeToken {
    pub fn new(clipboard: Arc<dyn Clipboard>) -> Self {
        Self { clipboard }
    }

    pub async fn arm(&self) -> Result<()> {
        self.clipboard
            .write(PASS_TOKEN)
            .await
            .context("failed to arm handshake token")?;
        info!("Handshake token armed");
        Ok(())
    }

    pub async fn is_armed(&self) -> bool {
        match self.clipboard.read().await {
            Ok(value) => value == PASS_TOKEN,
            Err(err) => {
                warn!("Handshake read failed, treating as disarmed: {err:#}");
                false
            }
        }
    }

    /// Clears the slot only while it still holds our token.
    pub async fn disarm(&self) {
        match self.clipboard.read().await {
            Ok(value) if value == PASS_TOKEN => {
                if let Err(err) = self.clipboard.write("").await {
                    warn!("Failed to clear handshake token: {err:#}");
                } else {
                    info!("Handshake token cleared");
                }
            }
            Ok(_) => {}
            Err(err) => warn!("Handshake read failed during disarm: {err:#}"),
        }
    }
}
