use std::sync::{Arc, Mutex};

use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;

use super::Clipboard;

/// Process-local slot for hosts without a system pasteboard. Automations
/// outside the process cannot see it.
#[derive(Default)]
pub struct LocalClipboard {
    slot: Mutex<String>,
}

impl LocalClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Clipboard for LocalClipboard {
    async fn read(&self) -> Result<String> {
        let slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("clipboard lock poisoned"))?;
        Ok(slot.clone())
    }

    async fn write(&self, value: &str) -> Result<()> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| anyhow!("clipboard lock poisoned"))?;
        *slot = value.to_string();
        Ok(())
    }
}

/// Runs `op` on the blocking pool against the handle in `slot`, opening it
/// first if needed. A failed op drops the handle so the next call reopens it.
#[cfg(any(feature = "desktop", test))]
async fn with_handle_blocking<H, E, T>(
    slot: Arc<Mutex<Option<H>>>,
    open: impl FnOnce() -> Result<H, E> + Send + 'static,
    op: impl FnOnce(&mut H) -> Result<T, E> + Send + 'static,
) -> Result<T>
where
    H: Send + 'static,
    E: std::fmt::Display,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(move || {
        let mut guard = slot
            .lock()
            .map_err(|_| anyhow!("clipboard lock poisoned"))?;

        if guard.is_none() {
            *guard = Some(open().map_err(|err| anyhow!("failed to open clipboard: {err}"))?);
        }

        let handle = guard
            .as_mut()
            .ok_or_else(|| anyhow!("clipboard unavailable"))?;

        match op(handle) {
            Ok(value) => Ok(value),
            Err(err) => {
                *guard = None;
                Err(anyhow!("clipboard operation failed: {err}"))
            }
        }
    })
    .await
    .context("clipboard worker join failed")?
}

/// System pasteboard via `arboard`. The handle is opened lazily and reopened
/// after a failure, since the display connection can go away underneath us.
#[cfg(feature = "desktop")]
#[derive(Default)]
pub struct SystemClipboard {
    handle: Arc<Mutex<Option<arboard::Clipboard>>>,
}

#[cfg(feature = "desktop")]
impl SystemClipboard {
    pub fn new() -> Self {
        Self::default()
    }
}

#[cfg(feature = "desktop")]
#[async_trait]
impl Clipboard for SystemClipboard {
    async fn read(&self) -> Result<String> {
        with_handle_blocking(self.handle.clone(), arboard::Clipboard::new, |clipboard| {
            match clipboard.get_text() {
                // Empty or non-text pasteboard reads as empty.
                Err(arboard::Error::ContentNotAvailable) => Ok(String::new()),
                other => other,
            }
        })
        .await
    }

    async fn write(&self, value: &str) -> Result<()> {
        let value = value.to_string();
        with_handle_blocking(self.handle.clone(), arboard::Clipboard::new, move |clipboard| {
            clipboard.set_text(value)
        })
        .await
    }
}
