use anyhow::{Context, Result};
use async_trait::async_trait;
use log::info;

use super::AppLauncher;

/// Opens URLs with the desktop's default handler.
///
/// Desktops have no "is this scheme installed" query, so reachability is an
/// allow-list taken from settings. Web URLs are always reachable.
pub struct SystemLauncher {
    reachable_schemes: Vec<String>,
}

impl SystemLauncher {
    pub fn new(reachable_schemes: Vec<String>) -> Self {
        Self {
            reachable_schemes: reachable_schemes
                .iter()
                .map(|scheme| normalize_scheme(scheme))
                .collect(),
        }
    }
}

fn normalize_scheme(scheme: &str) -> String {
    let scheme = scheme.split(':').next().unwrap_or(scheme);
    scheme.trim().to_ascii_lowercase()
}

#[async_trait]
impl AppLauncher for SystemLauncher {
    async fn can_open(&self, scheme: &str) -> bool {
        let scheme = normalize_scheme(scheme);
        scheme == "http" || scheme == "https" || self.reachable_schemes.contains(&scheme)
    }

    async fn open(&self, url: &str) -> Result<()> {
        let target = url.to_string();
        tokio::task::spawn_blocking(move || open::that(&target))
            .await
            .context("launcher worker join failed")?
            .with_context(|| format!("failed to open {url}"))?;
        info!("Opened {url}");
        Ok(())
    }
}
