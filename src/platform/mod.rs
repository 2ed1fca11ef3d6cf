//! Seams to the host platform: clipboard, notifications, app launching and
//! OS background tasks. Mobile hosts provide their own implementations; the
//! adapters here cover the desktop/headless host.

mod clipboard;
mod launcher;
mod notifier;
mod scheduler;

use std::{sync::Arc, time::Duration};

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

pub use clipboard::LocalClipboard;
#[cfg(feature = "desktop")]
pub use clipboard::SystemClipboard;
pub use launcher::SystemLauncher;
pub use notifier::LogNotifier;
pub use scheduler::TokioScheduler;

/// Pasteboard shared with automations outside this process. Never assume a
/// value written earlier is still there.
#[async_trait]
pub trait Clipboard: Send + Sync {
    async fn read(&self) -> Result<String>;

    async fn write(&self, value: &str) -> Result<()>;
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Notification {
    pub title: String,
    pub body: String,
    pub badge_count: u64,
    /// Asks for a critical alert; platforms are free to ignore it.
    pub critical: bool,
}

#[async_trait]
pub trait Notifier: Send + Sync {
    async fn request_permission(&self) -> Result<bool>;

    async fn schedule_immediate(&self, notification: Notification) -> Result<()>;

    async fn clear_badge(&self) -> Result<()>;

    async fn dismiss_all_delivered(&self) -> Result<()>;
}

#[async_trait]
pub trait AppLauncher: Send + Sync {
    /// Whether something is installed that handles `scheme`.
    async fn can_open(&self, scheme: &str) -> bool;

    async fn open(&self, url: &str) -> Result<()>;
}

/// Body of a recurring OS background task. Runs with no guarantee that the
/// process which registered it is the one executing it.
#[async_trait]
pub trait BackgroundJob: Send + Sync {
    async fn run(&self);
}

pub trait BackgroundScheduler: Send + Sync {
    /// Registering an existing name replaces the previous job.
    fn register(&self, name: &str, min_interval: Duration, job: Arc<dyn BackgroundJob>)
        -> Result<()>;

    fn unregister(&self, name: &str);
}
