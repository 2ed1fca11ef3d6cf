//! Reacts to cold start and foreground/background transitions so timer,
//! campaign and handshake stay consistent without the user doing anything.

use std::{
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, Mutex as StdMutex,
    },
    time::Duration,
};

use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, Mutex},
    task::JoinHandle,
    time,
};
use tokio_util::sync::CancellationToken;

use crate::{
    clock::Clock,
    handshake::HandshakeToken,
    platform::{BackgroundScheduler, Notifier},
    store::{keys, KeyValueStore},
    storm::NotificationStorm,
    timer::{BackgroundTimer, TIMER_TASK_NAME},
};

const ENABLE_LOGS: bool = true;

use crate::{log_info, log_warn};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum AppPhase {
    Foreground,
    Background,
}

pub type LifecycleCallback = Arc<dyn Fn() + Send + Sync>;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

#[derive(Default)]
struct Subscribers {
    foreground: Vec<(SubscriptionId, LifecycleCallback)>,
    background: Vec<(SubscriptionId, LifecycleCallback)>,
}

struct Listener {
    cancel_token: CancellationToken,
    handle: JoinHandle<()>,
}

pub struct LifecycleDeps {
    pub timer: BackgroundTimer,
    pub storm: NotificationStorm,
    pub handshake: HandshakeToken,
    pub store: Arc<dyn KeyValueStore>,
    pub notifier: Arc<dyn Notifier>,
    pub scheduler: Arc<dyn BackgroundScheduler>,
    pub clock: Arc<dyn Clock>,
    pub background_interval: Duration,
    pub notifier_timeout: Duration,
}

struct LifecycleInner {
    deps: LifecycleDeps,
    subscribers: StdMutex<Subscribers>,
    next_subscription: AtomicU64,
    listener: Mutex<Option<Listener>>,
    permission_requested: AtomicBool,
}

#[derive(Clone)]
pub struct AppLifecycle {
    inner: Arc<LifecycleInner>,
}

impl AppLifecycle {
    pub fn new(deps: LifecycleDeps) -> Self {
        Self {
            inner: Arc::new(LifecycleInner {
                deps,
                subscribers: StdMutex::new(Subscribers::default()),
                next_subscription: AtomicU64::new(1),
                listener: Mutex::new(None),
                permission_requested: AtomicBool::new(false),
            }),
        }
    }

    /// Cold-start reconciliation, background task registration, then
    /// listening for host transitions on `events`.
    pub async fn init(&self, events: mpsc::UnboundedReceiver<AppPhase>) {
        self.cold_start().await;

        let deps = &self.inner.deps;
        if let Err(err) = deps
            .timer
            .register_background_task(deps.scheduler.as_ref(), deps.background_interval)
        {
            log_warn!("Background expiry check unavailable: {err:#}");
        }

        self.listen(events).await;
    }

    pub async fn cold_start(&self) {
        let deps = &self.inner.deps;
        self.request_permission_once().await;

        let transition = deps.timer.lock_transitions().await;
        if deps.timer.is_active().await {
            if deps.timer.check_expired().await {
                log_info!("Timer expired while the app was not running");
                if let Err(err) = deps.storm.start().await {
                    log_warn!("Failed to start notification storm on cold start: {err:#}");
                }
            }
        } else {
            // Stale authorization from an abnormal exit.
            deps.handshake.disarm().await;
        }
        drop(transition);

        if let Err(err) = deps.storm.resume_if_active().await {
            log_warn!("Failed to resume notification storm: {err:#}");
        }

        deps.timer.set_foreground(true).await;
    }

    pub async fn handle_foreground(&self) {
        let deps = &self.inner.deps;
        self.record_last_active().await;
        deps.timer.set_foreground(true).await;

        let transition = deps.timer.lock_transitions().await;
        if deps.timer.is_active().await {
            if deps.timer.check_expired().await && !deps.storm.is_active().await {
                log_info!("Timer expired while in background, starting notification storm");
                if let Err(err) = deps.storm.start().await {
                    log_warn!("Failed to start notification storm on resume: {err:#}");
                }
            }
        } else {
            deps.handshake.disarm().await;
        }
        drop(transition);

        if let Err(err) = deps.storm.resume_if_active().await {
            log_warn!("Failed to resume notification storm: {err:#}");
        }

        self.notify(AppPhase::Foreground);
    }

    pub async fn handle_background(&self) {
        self.record_last_active().await;
        self.inner.deps.timer.set_foreground(false).await;
        self.notify(AppPhase::Background);
    }

    pub fn on_foreground(&self, callback: LifecycleCallback) -> SubscriptionId {
        self.subscribe(AppPhase::Foreground, callback)
    }

    pub fn on_background(&self, callback: LifecycleCallback) -> SubscriptionId {
        self.subscribe(AppPhase::Background, callback)
    }

    pub fn unsubscribe(&self, id: SubscriptionId) {
        let mut subscribers = self.lock_subscribers();
        subscribers.foreground.retain(|(existing, _)| *existing != id);
        subscribers.background.retain(|(existing, _)| *existing != id);
    }

    pub async fn teardown(&self) {
        if let Some(listener) = self.inner.listener.lock().await.take() {
            listener.cancel_token.cancel();
            if let Err(err) = listener.handle.await {
                log_warn!("Lifecycle listener did not shut down cleanly: {err}");
            }
        }

        {
            let mut subscribers = self.lock_subscribers();
            subscribers.foreground.clear();
            subscribers.background.clear();
        }

        let deps = &self.inner.deps;
        deps.scheduler.unregister(TIMER_TASK_NAME);
        deps.timer.set_foreground(false).await;
        log_info!("Lifecycle coordinator torn down");
    }

    pub async fn last_active_at_ms(&self) -> Option<i64> {
        match self.inner.deps.store.get(keys::LAST_ACTIVE_AT).await {
            Ok(value) => value.and_then(|raw| raw.parse().ok()),
            Err(_) => None,
        }
    }

    async fn listen(&self, mut events: mpsc::UnboundedReceiver<AppPhase>) {
        let mut listener_guard = self.inner.listener.lock().await;
        if let Some(previous) = listener_guard.take() {
            previous.cancel_token.cancel();
        }

        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let lifecycle = self.clone();

        let handle = tokio::spawn(async move {
            loop {
                tokio::select! {
                    event = events.recv() => match event {
                        Some(AppPhase::Foreground) => lifecycle.handle_foreground().await,
                        Some(AppPhase::Background) => lifecycle.handle_background().await,
                        None => break,
                    },
                    _ = token.cancelled() => break,
                }
            }
        });

        *listener_guard = Some(Listener {
            cancel_token,
            handle,
        });
    }

    async fn request_permission_once(&self) {
        if self.inner.permission_requested.swap(true, Ordering::SeqCst) {
            return;
        }

        let deps = &self.inner.deps;
        match time::timeout(deps.notifier_timeout, deps.notifier.request_permission()).await {
            Ok(Ok(true)) => log_info!("Notification permission granted"),
            Ok(Ok(false)) => log_warn!("Notification permission denied; nudges are best effort"),
            Ok(Err(err)) => log_warn!("Notification permission request failed: {err:#}"),
            Err(_) => log_warn!("Notification permission request timed out"),
        }
    }

    async fn record_last_active(&self) {
        let deps = &self.inner.deps;
        let now_ms = deps.clock.now_ms().to_string();
        if let Err(err) = deps.store.set(keys::LAST_ACTIVE_AT, &now_ms).await {
            log_warn!("Failed to record last active time: {err:#}");
        }
    }

    fn subscribe(&self, phase: AppPhase, callback: LifecycleCallback) -> SubscriptionId {
        let id = SubscriptionId(self.inner.next_subscription.fetch_add(1, Ordering::SeqCst));
        let mut subscribers = self.lock_subscribers();
        match phase {
            AppPhase::Foreground => subscribers.foreground.push((id, callback)),
            AppPhase::Background => subscribers.background.push((id, callback)),
        }
        id
    }

    fn notify(&self, phase: AppPhase) {
        let callbacks: Vec<LifecycleCallback> = {
            let subscribers = self.lock_subscribers();
            let list = match phase {
                AppPhase::Foreground => &subscribers.foreground,
                AppPhase::Background => &subscribers.background,
            };
            list.iter().map(|(_, callback)| callback.clone()).collect()
        };

        for callback in callbacks {
            callback();
        }
    }

    fn lock_subscribers(&self) -> std::sync::MutexGuard<'_, Subscribers> {
        match self.inner.subscribers.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}
