use std::sync::atomic::{AtomicU64, Ordering};

use anyhow::Result;
use async_trait::async_trait;
use log::{info, warn};

use super::{Notification, Notifier};

/// Headless notifier: every alert goes to the log. Keeps a delivered count
/// so `dismiss_all_delivered` has something to report.
#[derive(Default)]
pub struct LogNotifier {
    delivered: AtomicU64,
}

impl LogNotifier {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Notifier for LogNotifier {
    async fn request_permission(&self) -> Result<bool> {
        Ok(true)
    }

    async fn schedule_immediate(&self, notification: Notification) -> Result<()> {
        self.delivered.fetch_add(1, Ordering::SeqCst);
        if notification.critical {
            warn!(
                "[notify] {} - {} (badge {})",
                notification.title, notification.body, notification.badge_count
            );
        } else {
            info!(
                "[notify] {} - {} (badge {})",
                notification.title, notification.body, notification.badge_count
            );
        }
        Ok(())
    }

    async fn clear_badge(&self) -> Result<()> {
        info!("[notify] badge cleared");
        Ok(())
    }

    async fn dismiss_all_delivered(&self) -> Result<()> {
        let dismissed = self.delivered.swap(0, Ordering::SeqCst);
        info!("[notify] dismissed {dismissed} delivered notifications");
        Ok(())
    }
}
