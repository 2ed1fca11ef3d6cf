use std::{
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};

use anyhow::{Context, Result};
use log::{debug, error, info, warn};
use serde::Serialize;
use tokio::{
    sync::Mutex,
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    platform::{Notification, Notifier},
    settings::GuardSettings,
    store::{flag_value, keys, parse_flag, KeyValueStore},
};

use super::messages::{default_messages, message_at, NUDGE_TITLE};

#[derive(Debug, Clone)]
pub struct StormConfig {
    pub interval: Duration,
    pub notifier_timeout: Duration,
    pub title: String,
    pub messages: Vec<String>,
}

impl Default for StormConfig {
    fn default() -> Self {
        Self {
            interval: Duration::from_secs(5),
            notifier_timeout: Duration::from_secs(10),
            title: NUDGE_TITLE.to_string(),
            messages: default_messages(),
        }
    }
}

impl StormConfig {
    pub fn from_settings(settings: &GuardSettings) -> Self {
        Self {
            interval: settings.storm_interval(),
            notifier_timeout: settings.notifier_timeout(),
            ..Self::default()
        }
    }
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct StormSnapshot {
    pub active: bool,
    pub emitting: bool,
    pub emitted: u64,
}

struct Emitter {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

struct StormInner {
    store: Arc<dyn KeyValueStore>,
    notifier: Arc<dyn Notifier>,
    config: StormConfig,
    emitter: Mutex<Option<Emitter>>,
    /// Notifications sent by this process in the current campaign.
    counter: AtomicU64,
}

/// Repeating nudge campaign that runs until explicitly stopped.
///
/// Only the active flag is authoritative across restarts; the emitter and
/// the message counter are per-process, so a resumed campaign starts over
/// at the first message.
#[derive(Clone)]
pub struct NotificationStorm {
    inner: Arc<StormInner>,
}

impl NotificationStorm {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        notifier: Arc<dyn Notifier>,
        config: StormConfig,
    ) -> Self {
        Self {
            inner: Arc::new(StormInner {
                store,
                notifier,
                config,
                emitter: Mutex::new(None),
                counter: AtomicU64::new(0),
            }),
        }
    }

    pub async fn start(&self) -> Result<()> {
        let mut emitter = self.inner.emitter.lock().await;
        if let Some(existing) = emitter.as_ref() {
            if !existing.handle.is_finished() {
                debug!("Notification storm already running in this process");
                return Ok(());
            }
        }

        self.inner.counter.store(0, Ordering::SeqCst);
        self.inner
            .store
            .set(keys::STORM_ACTIVE, &flag_value(true))
            .await
            .context("failed to persist storm flag")?;

        info!("Notification storm started");
        emit_next(&self.inner).await;

        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let inner = self.inner.clone();
        let interval = self.inner.config.interval;

        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        let sent = emit_next(&inner).await;
                        if let Err(err) = inner
                            .store
                            .set(keys::STORM_COUNT, &sent.to_string())
                            .await
                        {
                            warn!("Failed to persist storm count: {err:#}");
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });

        *emitter = Some(Emitter {
            cancel_token,
            handle,
        });
        Ok(())
    }

    /// Ends the campaign and withdraws what it delivered. Safe to call
    /// repeatedly.
    pub async fn stop(&self) {
        let mut emitter = self.inner.emitter.lock().await;
        if let Some(running) = emitter.take() {
            running.cancel_token.cancel();
            // Abort as well so a send that is in flight cannot land after
            // the dismissal below.
            running.handle.abort();
            info!(
                "Notification storm stopped after {} notifications",
                self.inner.counter.load(Ordering::SeqCst)
            );
        }

        if let Err(err) = self
            .inner
            .store
            .multi_remove(&[keys::STORM_ACTIVE, keys::STORM_COUNT])
            .await
        {
            error!("Failed to clear storm state: {err:#}");
        }

        let timeout = self.inner.config.notifier_timeout;
        match time::timeout(timeout, self.inner.notifier.clear_badge()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("Failed to clear badge: {err:#}"),
            Err(_) => warn!("Clearing badge timed out after {}s", timeout.as_secs()),
        }
        match time::timeout(timeout, self.inner.notifier.dismiss_all_delivered()).await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => warn!("Failed to dismiss delivered notifications: {err:#}"),
            Err(_) => warn!("Dismissing notifications timed out after {}s", timeout.as_secs()),
        }
    }

    /// Persisted flag; false when it cannot be read.
    pub async fn is_active(&self) -> bool {
        match self.inner.store.get(keys::STORM_ACTIVE).await {
            Ok(value) => parse_flag(value.as_deref()),
            Err(err) => {
                warn!("Storm state unreadable, treating as inactive: {err:#}");
                false
            }
        }
    }

    pub async fn has_emitter(&self) -> bool {
        self.inner
            .emitter
            .lock()
            .await
            .as_ref()
            .map(|emitter| !emitter.handle.is_finished())
            .unwrap_or(false)
    }

    /// Restarts emission when the flag survived but the emitter did not,
    /// e.g. after the process was killed mid-campaign. Returns whether a
    /// campaign was restarted.
    pub async fn resume_if_active(&self) -> Result<bool> {
        if !self.is_active().await || self.has_emitter().await {
            return Ok(false);
        }
        info!("Resuming notification storm left active by a previous process");
        self.start().await?;
        Ok(true)
    }

    pub fn emitted_count(&self) -> u64 {
        self.inner.counter.load(Ordering::SeqCst)
    }

    pub async fn snapshot(&self) -> StormSnapshot {
        StormSnapshot {
            active: self.is_active().await,
            emitting: self.has_emitter().await,
            emitted: self.emitted_count(),
        }
    }
}

/// Sends the next message in the cycle and returns how many have gone out.
/// A failed or hung send is logged and counted anyway so the cycle keeps
/// moving.
async fn emit_next(inner: &StormInner) -> u64 {
    let index = inner.counter.fetch_add(1, Ordering::SeqCst);
    let notification = Notification {
        title: inner.config.title.clone(),
        body: message_at(&inner.config.messages, index).to_string(),
        badge_count: index + 1,
        critical: true,
    };

    let timeout = inner.config.notifier_timeout;
    match time::timeout(timeout, inner.notifier.schedule_immediate(notification)).await {
        Ok(Ok(())) => debug!("Nudge #{} sent", index + 1),
        Ok(Err(err)) => warn!("Nudge #{} not delivered: {err:#}", index + 1),
        Err(_) => warn!(
            "Nudge #{} timed out after {}s",
            index + 1,
            timeout.as_secs()
        ),
    }

    index + 1
}
