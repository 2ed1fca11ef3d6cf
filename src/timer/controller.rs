use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc, RwLock,
    },
    time::Duration,
};

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Serialize;
use tokio::{
    sync::{Mutex, MutexGuard},
    task::JoinHandle,
    time::{self, Instant, MissedTickBehavior},
};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::Clock,
    platform::{BackgroundJob, BackgroundScheduler},
    store::KeyValueStore,
};

use super::state::{TimerRecord, TIMER_KEYS};

const ENABLE_LOGS: bool = true;

use crate::{log_debug, log_error, log_info, log_warn};

pub const TIMER_TASK_NAME: &str = "scrollguard.timer-check";

/// Called once per expired countdown.
#[async_trait]
pub trait ExpireHandler: Send + Sync {
    async fn on_expire(&self);
}

#[derive(Debug, Serialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct TimerSnapshot {
    pub record: Option<TimerRecord>,
    pub remaining_ms: u64,
    pub expired: bool,
}

struct PollHandle {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

struct TimerInner {
    store: Arc<dyn KeyValueStore>,
    clock: Arc<dyn Clock>,
    handler: RwLock<Arc<dyn ExpireHandler>>,
    poll: Mutex<Option<PollHandle>>,
    /// Held while firing and by callers that arm or clear a countdown, so
    /// a fire can never interleave with a session change.
    transition_lock: Mutex<()>,
    foreground: AtomicBool,
    poll_interval: Duration,
}

/// Durable countdown for one away-from-app session.
///
/// The record lives in the key/value store; only the handler and the
/// foreground poll live in memory. The handler is a constructor argument so
/// a freshly booted process can never run the background check without one.
#[derive(Clone)]
pub struct BackgroundTimer {
    inner: Arc<TimerInner>,
}

impl BackgroundTimer {
    pub fn new(
        store: Arc<dyn KeyValueStore>,
        clock: Arc<dyn Clock>,
        poll_interval: Duration,
        handler: Arc<dyn ExpireHandler>,
    ) -> Self {
        Self {
            inner: Arc::new(TimerInner {
                store,
                clock,
                handler: RwLock::new(handler),
                poll: Mutex::new(None),
                transition_lock: Mutex::new(()),
                foreground: AtomicBool::new(true),
                poll_interval,
            }),
        }
    }

    pub fn set_expire_handler(&self, handler: Arc<dyn ExpireHandler>) {
        match self.inner.handler.write() {
            Ok(mut guard) => *guard = handler,
            Err(poisoned) => *poisoned.into_inner() = handler,
        }
    }

    fn handler(&self) -> Arc<dyn ExpireHandler> {
        match self.inner.handler.read() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    /// Arms a countdown, replacing whatever was armed before.
    pub async fn start(&self, duration_minutes: u32) -> Result<()> {
        if duration_minutes == 0 {
            bail!("timer duration must be greater than zero");
        }

        let record = TimerRecord::armed(
            self.inner.clock.now_ms(),
            i64::from(duration_minutes) * 60_000,
        );
        self.inner
            .store
            .multi_set(&record.entries())
            .await
            .context("failed to persist timer record")?;

        log_info!(
            "Timer armed for {} min (started at {})",
            duration_minutes,
            record.started_at_ms
        );

        if self.inner.foreground.load(Ordering::SeqCst) {
            self.spawn_poll().await;
        }
        Ok(())
    }

    /// Clears the record and the poll. Safe to call repeatedly.
    pub async fn stop(&self) {
        self.cancel_poll().await;
        if let Err(err) = self.inner.store.multi_remove(&TIMER_KEYS).await {
            log_error!("Failed to clear timer record: {err:#}");
        }
    }

    pub async fn record(&self) -> Option<TimerRecord> {
        match TimerRecord::load(self.inner.store.as_ref()).await {
            Ok(record) => record,
            Err(err) => {
                log_warn!("Timer state unreadable, treating as inactive: {err:#}");
                None
            }
        }
    }

    pub async fn is_active(&self) -> bool {
        self.record().await.is_some()
    }

    pub async fn check_expired(&self) -> bool {
        self.record()
            .await
            .map(|record| record.is_expired(self.inner.clock.now_ms()))
            .unwrap_or(false)
    }

    pub async fn remaining_ms(&self) -> u64 {
        self.record()
            .await
            .map(|record| record.remaining_ms(self.inner.clock.now_ms()))
            .unwrap_or(0)
    }

    pub async fn snapshot(&self) -> TimerSnapshot {
        let record = self.record().await;
        let now_ms = self.inner.clock.now_ms();
        TimerSnapshot {
            remaining_ms: record.map(|r| r.remaining_ms(now_ms)).unwrap_or(0),
            expired: record.map(|r| r.is_expired(now_ms)).unwrap_or(false),
            record,
        }
    }

    /// Guard shared with `fire_if_expired`. Hold it across any sequence that
    /// stops, restarts or reacts to a countdown. Not reentrant: do not call
    /// `fire_if_expired` while holding it.
    pub async fn lock_transitions(&self) -> MutexGuard<'_, ()> {
        self.inner.transition_lock.lock().await
    }

    /// Runs the handler and consumes the record if the countdown is over.
    /// Returns whether it fired. Concurrent callers in this process fire at
    /// most once; a second process reading the same store can still race.
    pub async fn fire_if_expired(&self) -> bool {
        let _transition = self.lock_transitions().await;
        if !self.check_expired().await {
            return false;
        }

        log_info!("Timer expired, running expire handler");
        self.handler().on_expire().await;
        self.stop().await;
        true
    }

    /// The fast poll only runs while the app is in the foreground; the OS
    /// background task covers the rest.
    pub async fn set_foreground(&self, foreground: bool) {
        self.inner.foreground.store(foreground, Ordering::SeqCst);
        if foreground {
            if self.is_active().await {
                self.spawn_poll().await;
            }
        } else {
            self.cancel_poll().await;
        }
    }

    pub async fn is_polling(&self) -> bool {
        self.inner
            .poll
            .lock()
            .await
            .as_ref()
            .map(|poll| !poll.handle.is_finished())
            .unwrap_or(false)
    }

    pub fn register_background_task(
        &self,
        scheduler: &dyn BackgroundScheduler,
        min_interval: Duration,
    ) -> Result<()> {
        scheduler
            .register(
                TIMER_TASK_NAME,
                min_interval,
                Arc::new(TimerCheckJob {
                    timer: self.clone(),
                }),
            )
            .context("failed to register timer background task")
    }

    async fn spawn_poll(&self) {
        let mut poll_guard = self.inner.poll.lock().await;
        if let Some(existing) = poll_guard.as_ref() {
            if !existing.handle.is_finished() {
                return;
            }
        }

        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let timer = self.clone();
        let interval = self.inner.poll_interval;

        log_debug!("Foreground poll every {}ms", interval.as_millis());
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + interval, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        if timer.fire_if_expired().await {
                            break;
                        }
                    }
                    _ = token.cancelled() => break,
                }
            }
        });

        *poll_guard = Some(PollHandle {
            cancel_token,
            handle,
        });
    }

    /// Cancels without joining: the poll itself ends up here via `stop()`.
    async fn cancel_poll(&self) {
        if let Some(poll) = self.inner.poll.lock().await.take() {
            poll.cancel_token.cancel();
            log_debug!("Foreground poll cancelled");
        }
    }
}

/// Background body: everything is re-read from the store, nothing from the
/// process that registered it.
struct TimerCheckJob {
    timer: BackgroundTimer,
}

#[async_trait]
impl BackgroundJob for TimerCheckJob {
    async fn run(&self) {
        if self.timer.fire_if_expired().await {
            log_info!("Background check fired expired timer");
        }
    }
}
