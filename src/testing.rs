//! Fakes for the platform seams, shared by the unit tests.

use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, AtomicU32, Ordering},
        Arc, Mutex,
    },
    time::Duration,
};

use anyhow::{bail, Result};
use async_trait::async_trait;
use tokio::sync::Notify;

use crate::platform::{
    AppLauncher, BackgroundJob, BackgroundScheduler, Clipboard, Notification, Notifier,
};

#[derive(Default)]
pub struct FakeClipboard {
    value: Mutex<String>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
}

impl FakeClipboard {
    pub fn contents(&self) -> String {
        self.value.lock().unwrap().clone()
    }

    pub fn put(&self, value: &str) {
        *self.value.lock().unwrap() = value.to_string();
    }
}

#[async_trait]
impl Clipboard for FakeClipboard {
    async fn read(&self) -> Result<String> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("clipboard read failure (injected)");
        }
        Ok(self.contents())
    }

    async fn write(&self, value: &str) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("clipboard write failure (injected)");
        }
        self.put(value);
        Ok(())
    }
}

#[derive(Default)]
pub struct RecordingNotifier {
    sent: Mutex<Vec<Notification>>,
    pub permission_requests: AtomicU32,
    pub badge_clears: AtomicU32,
    pub dismissals: AtomicU32,
    pub fail_sends: AtomicBool,
    pub deny_permission: AtomicBool,
    /// When set, `clear_badge` signals `badge_clear_started` and then waits
    /// for `release_badge_clear`.
    pub hold_badge_clear: AtomicBool,
    pub badge_clear_started: Notify,
    pub release_badge_clear: Notify,
}

impl RecordingNotifier {
    pub fn sent(&self) -> Vec<Notification> {
        self.sent.lock().unwrap().clone()
    }

    pub fn sent_count(&self) -> usize {
        self.sent.lock().unwrap().len()
    }
}

#[async_trait]
impl Notifier for RecordingNotifier {
    async fn request_permission(&self) -> Result<bool> {
        self.permission_requests.fetch_add(1, Ordering::SeqCst);
        Ok(!self.deny_permission.load(Ordering::SeqCst))
    }

    async fn schedule_immediate(&self, notification: Notification) -> Result<()> {
        if self.fail_sends.load(Ordering::SeqCst) {
            bail!("notification permission denied (injected)");
        }
        self.sent.lock().unwrap().push(notification);
        Ok(())
    }

    async fn clear_badge(&self) -> Result<()> {
        self.badge_clears.fetch_add(1, Ordering::SeqCst);
        if self.hold_badge_clear.load(Ordering::SeqCst) {
            self.badge_clear_started.notify_one();
            self.release_badge_clear.notified().await;
        }
        Ok(())
    }

    async fn dismiss_all_delivered(&self) -> Result<()> {
        self.dismissals.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

pub struct FakeLauncher {
    pub reachable: AtomicBool,
    pub fail_open: AtomicBool,
    opened: Mutex<Vec<String>>,
}

impl Default for FakeLauncher {
    fn default() -> Self {
        Self {
            reachable: AtomicBool::new(true),
            fail_open: AtomicBool::new(false),
            opened: Mutex::new(Vec::new()),
        }
    }
}

impl FakeLauncher {
    pub fn opened(&self) -> Vec<String> {
        self.opened.lock().unwrap().clone()
    }
}

#[async_trait]
impl AppLauncher for FakeLauncher {
    async fn can_open(&self, _scheme: &str) -> bool {
        self.reachable.load(Ordering::SeqCst)
    }

    async fn open(&self, url: &str) -> Result<()> {
        if self.fail_open.load(Ordering::SeqCst) {
            bail!("deep link refused (injected)");
        }
        self.opened.lock().unwrap().push(url.to_string());
        Ok(())
    }
}

/// Records registrations; jobs only run when a test calls `run`.
#[derive(Default)]
pub struct FakeScheduler {
    jobs: Mutex<HashMap<String, (Duration, Arc<dyn BackgroundJob>)>>,
}

impl FakeScheduler {
    pub fn interval_of(&self, name: &str) -> Option<Duration> {
        self.jobs.lock().unwrap().get(name).map(|(interval, _)| *interval)
    }

    pub async fn run(&self, name: &str) {
        let job = self
            .jobs
            .lock()
            .unwrap()
            .get(name)
            .map(|(_, job)| job.clone());
        if let Some(job) = job {
            job.run().await;
        }
    }
}

impl BackgroundScheduler for FakeScheduler {
    fn register(
        &self,
        name: &str,
        min_interval: Duration,
        job: Arc<dyn BackgroundJob>,
    ) -> Result<()> {
        self.jobs
            .lock()
            .unwrap()
            .insert(name.to_string(), (min_interval, job));
        Ok(())
    }

    fn unregister(&self, name: &str) {
        self.jobs.lock().unwrap().remove(name);
    }
}
