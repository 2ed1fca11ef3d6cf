use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;
use log::{error, info, warn};
use serde::{Deserialize, Serialize};
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::{
    clock::Clock,
    handshake::HandshakeToken,
    platform::AppLauncher,
    settings::{GuardSettings, MAX_SCROLL_MINUTES},
    storm::NotificationStorm,
    timer::{BackgroundTimer, ExpireHandler},
};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionKind {
    Messages,
    Scroll,
}

impl SessionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            SessionKind::Messages => "messages",
            SessionKind::Scroll => "scroll",
        }
    }
}

/// In-memory view of the current session. Not persisted: after a restart an
/// armed timer is still visible, but its kind is unknown.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    pub id: Option<String>,
    pub kind: Option<SessionKind>,
    pub started_at_ms: Option<i64>,
    pub duration_ms: Option<i64>,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum LaunchOutcome {
    Launched,
    InvalidDuration,
    AppUnavailable,
    OpenFailed,
}

impl LaunchOutcome {
    pub fn is_launched(&self) -> bool {
        matches!(self, LaunchOutcome::Launched)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub enum SessionPhase {
    Idle,
    Armed,
    /// Countdown is over but no campaign has picked it up yet.
    Expired,
    Nudging,
}

/// Expire handler wired into the timer: an expired session starts nudging.
pub struct StartStormOnExpire {
    storm: NotificationStorm,
}

impl StartStormOnExpire {
    pub fn new(storm: NotificationStorm) -> Self {
        Self { storm }
    }
}

#[async_trait]
impl ExpireHandler for StartStormOnExpire {
    async fn on_expire(&self) {
        if let Err(err) = self.storm.start().await {
            error!("Failed to start notification storm on expiry: {err:#}");
        }
    }
}

/// Sole entry point for leaving the app. Launch and stop hold the timer's
/// transition guard, the same one expiry firing takes, so handshake, timer
/// and campaign move together and a fire never lands inside a transition.
pub struct SessionOrchestrator {
    timer: BackgroundTimer,
    storm: NotificationStorm,
    handshake: HandshakeToken,
    launcher: Arc<dyn AppLauncher>,
    clock: Arc<dyn Clock>,
    settings: GuardSettings,
    session: Mutex<Option<SessionInfo>>,
}

impl SessionOrchestrator {
    pub fn new(
        timer: BackgroundTimer,
        storm: NotificationStorm,
        handshake: HandshakeToken,
        launcher: Arc<dyn AppLauncher>,
        clock: Arc<dyn Clock>,
        settings: GuardSettings,
    ) -> Self {
        Self {
            timer,
            storm,
            handshake,
            launcher,
            clock,
            settings,
            session: Mutex::new(None),
        }
    }

    fn max_scroll_minutes(&self) -> u32 {
        self.settings.max_scroll_minutes.min(MAX_SCROLL_MINUTES)
    }

    fn minutes_for(&self, kind: SessionKind, requested_minutes: u32) -> Option<u32> {
        match kind {
            SessionKind::Messages => Some(self.settings.messages_minutes).filter(|m| *m > 0),
            SessionKind::Scroll => (1..=self.max_scroll_minutes())
                .contains(&requested_minutes)
                .then_some(requested_minutes),
        }
    }

    fn url_for(&self, kind: SessionKind) -> &str {
        match kind {
            SessionKind::Messages => &self.settings.messages_url,
            SessionKind::Scroll => &self.settings.scroll_url,
        }
    }

    /// Arms a session and opens the target app. `duration_minutes` is
    /// ignored for messages, which always get the fixed short window.
    ///
    /// Rejections (bad duration, app missing, deep link refused) come back
    /// as outcomes with nothing left armed; `Err` means storage or the
    /// clipboard failed while arming, also after rolling back.
    pub async fn launch_with_intent(
        &self,
        kind: SessionKind,
        duration_minutes: u32,
    ) -> Result<LaunchOutcome> {
        let _transition = self.timer.lock_transitions().await;

        let Some(minutes) = self.minutes_for(kind, duration_minutes) else {
            warn!(
                "Rejected {} session with {} min (allowed 1..={})",
                kind.as_str(),
                duration_minutes,
                self.max_scroll_minutes()
            );
            return Ok(LaunchOutcome::InvalidDuration);
        };

        if !self.launcher.can_open(&self.settings.target_scheme).await {
            warn!(
                "Target app for {} is not reachable",
                self.settings.target_scheme
            );
            return Ok(LaunchOutcome::AppUnavailable);
        }

        if self.storm.is_active().await || self.storm.has_emitter().await {
            info!("New session supersedes active notification storm");
            self.storm.stop().await;
        }

        if self.timer.is_active().await {
            info!("New session supersedes active timer");
            self.timer.stop().await;
        }

        self.handshake.arm().await?;

        if let Err(err) = self.timer.start(minutes).await {
            self.handshake.disarm().await;
            return Err(err.context("failed to arm session timer"));
        }

        let info = SessionInfo {
            id: Some(Uuid::new_v4().to_string()),
            kind: Some(kind),
            started_at_ms: Some(self.clock.now_ms()),
            duration_ms: Some(i64::from(minutes) * 60_000),
        };
        let session_id = info.id.clone().unwrap_or_default();
        *self.session.lock().await = Some(info);

        let url = self.url_for(kind).to_string();
        if let Err(err) = self.launcher.open(&url).await {
            warn!("Deep link {url} failed, rolling back session {session_id}: {err:#}");
            self.timer.stop().await;
            self.handshake.disarm().await;
            *self.session.lock().await = None;
            return Ok(LaunchOutcome::OpenFailed);
        }

        info!(
            "Session {} started: {} for {} min",
            session_id,
            kind.as_str(),
            minutes
        );
        Ok(LaunchOutcome::Launched)
    }

    /// The only way back to idle.
    pub async fn stop_session(&self) {
        let _transition = self.timer.lock_transitions().await;

        self.storm.stop().await;
        self.timer.stop().await;
        self.handshake.disarm().await;

        if let Some(info) = self.session.lock().await.take() {
            info!(
                "Session {} stopped",
                info.id.as_deref().unwrap_or("<unknown>")
            );
        }
    }

    pub async fn session_info(&self) -> SessionInfo {
        self.session.lock().await.clone().unwrap_or_default()
    }

    pub async fn remaining_ms(&self) -> u64 {
        self.timer.remaining_ms().await
    }

    pub async fn has_active_session(&self) -> bool {
        self.timer.is_active().await
    }

    pub async fn is_nudge_active(&self) -> bool {
        self.storm.is_active().await
    }

    pub async fn phase(&self) -> SessionPhase {
        if self.storm.is_active().await {
            return SessionPhase::Nudging;
        }
        match self.timer.record().await {
            Some(record) if record.is_expired(self.clock.now_ms()) => SessionPhase::Expired,
            Some(_) => SessionPhase::Armed,
            None => SessionPhase::Idle,
        }
    }

    /// Runs the same check as the foreground poll, on demand.
    pub async fn check_expiry(&self) -> bool {
        self.timer.fire_if_expired().await
    }

    pub fn timer(&self) -> &BackgroundTimer {
        &self.timer
    }

    pub fn storm(&self) -> &NotificationStorm {
        &self.storm
    }

    pub fn handshake(&self) -> &HandshakeToken {
        &self.handshake
    }
}

#[cfg(test)]
mod tests {
    use std::{collections::HashMap, sync::atomic::Ordering, time::Duration};

    use tokio::sync::Notify;

    use super::*;
    use crate::{
        clock::ManualClock,
        handshake::PASS_TOKEN,
        storm::StormConfig,
        store::{keys, MemoryStore},
        testing::{FakeClipboard, FakeLauncher, RecordingNotifier},
        timer::TimerRecord,
    };

    struct Harness {
        store: Arc<MemoryStore>,
        clock: ManualClock,
        clipboard: Arc<FakeClipboard>,
        notifier: Arc<RecordingNotifier>,
        launcher: Arc<FakeLauncher>,
        orchestrator: Arc<SessionOrchestrator>,
    }

    impl Harness {
        fn new() -> Self {
            Self::with_settings(GuardSettings::default())
        }

        fn with_settings(settings: GuardSettings) -> Self {
            let store = Arc::new(MemoryStore::new());
            let clock = ManualClock::new(1_700_000_000_000);
            let clipboard = Arc::new(FakeClipboard::default());
            let notifier = Arc::new(RecordingNotifier::default());
            let launcher = Arc::new(FakeLauncher::default());

            let storm = NotificationStorm::new(
                store.clone(),
                notifier.clone(),
                StormConfig::default(),
            );
            let timer = BackgroundTimer::new(
                store.clone(),
                Arc::new(clock.clone()),
                Duration::from_secs(5),
                Arc::new(StartStormOnExpire::new(storm.clone())),
            );
            let orchestrator = Arc::new(SessionOrchestrator::new(
                timer,
                storm,
                HandshakeToken::new(clipboard.clone()),
                launcher.clone(),
                Arc::new(clock.clone()),
                settings,
            ));

            Self {
                store,
                clock,
                clipboard,
                notifier,
                launcher,
                orchestrator,
            }
        }

        fn timer_and_storm_keys(&self) -> HashMap<String, String> {
            self.store
                .snapshot()
                .into_iter()
                .filter(|(key, _)| key.starts_with("timer.") || key.starts_with("storm."))
                .collect()
        }
    }

    #[tokio::test]
    async fn messages_session_end_to_end() {
        let h = Harness::new();

        let outcome = h
            .orchestrator
            .launch_with_intent(SessionKind::Messages, 0)
            .await
            .unwrap();
        assert!(outcome.is_launched());
        assert_eq!(h.launcher.opened(), vec!["instagram://direct-inbox".to_string()]);
        assert_eq!(h.clipboard.contents(), PASS_TOKEN);
        assert_eq!(h.orchestrator.phase().await, SessionPhase::Armed);

        let remaining = h.orchestrator.remaining_ms().await;
        assert!(remaining > 0 && remaining <= 120_000);
        let info = h.orchestrator.session_info().await;
        assert_eq!(info.kind, Some(SessionKind::Messages));
        assert_eq!(info.duration_ms, Some(120_000));

        h.clock.advance_ms(120_000);
        assert_eq!(h.orchestrator.phase().await, SessionPhase::Expired);
        assert!(h.orchestrator.check_expiry().await);
        assert!(h.orchestrator.is_nudge_active().await);
        assert_eq!(h.orchestrator.phase().await, SessionPhase::Nudging);
        assert_eq!(h.notifier.sent_count(), 1);

        h.orchestrator.stop_session().await;
        assert!(!h.orchestrator.has_active_session().await);
        assert!(!h.orchestrator.is_nudge_active().await);
        assert!(!h.orchestrator.handshake().is_armed().await);
        assert_eq!(h.orchestrator.session_info().await, SessionInfo::default());
        assert_eq!(h.orchestrator.phase().await, SessionPhase::Idle);
    }

    #[tokio::test]
    async fn open_failure_rolls_back() {
        let h = Harness::new();
        h.launcher.fail_open.store(true, Ordering::SeqCst);

        let outcome = h
            .orchestrator
            .launch_with_intent(SessionKind::Scroll, 10)
            .await
            .unwrap();
        assert_eq!(outcome, LaunchOutcome::OpenFailed);
        assert!(!h.orchestrator.has_active_session().await);
        assert!(!h.orchestrator.handshake().is_armed().await);
        assert!(!h.orchestrator.timer().is_polling().await);
        assert_eq!(h.orchestrator.session_info().await, SessionInfo::default());
    }

    #[tokio::test]
    async fn out_of_range_scroll_touches_nothing() {
        let h = Harness::new();
        h.clipboard.put("something the user copied");
        let before = h.store.snapshot();

        for minutes in [0, 61] {
            let outcome = h
                .orchestrator
                .launch_with_intent(SessionKind::Scroll, minutes)
                .await
                .unwrap();
            assert_eq!(outcome, LaunchOutcome::InvalidDuration);
        }

        assert_eq!(h.store.snapshot(), before);
        assert_eq!(h.clipboard.contents(), "something the user copied");
        assert!(h.launcher.opened().is_empty());
    }

    #[tokio::test]
    async fn scroll_bounds_are_inclusive() {
        let h = Harness::new();
        for minutes in [1, 60] {
            let outcome = h
                .orchestrator
                .launch_with_intent(SessionKind::Scroll, minutes)
                .await
                .unwrap();
            assert!(outcome.is_launched());
        }
        assert_eq!(h.orchestrator.remaining_ms().await, 60 * 60_000);
        h.orchestrator.stop_session().await;
    }

    #[tokio::test]
    async fn unreachable_app_touches_nothing() {
        let h = Harness::new();
        h.launcher.reachable.store(false, Ordering::SeqCst);

        let outcome = h
            .orchestrator
            .launch_with_intent(SessionKind::Messages, 0)
            .await
            .unwrap();
        assert_eq!(outcome, LaunchOutcome::AppUnavailable);
        assert!(h.timer_and_storm_keys().is_empty());
        assert_eq!(h.clipboard.contents(), "");
    }

    #[tokio::test]
    async fn new_session_supersedes_old_one_and_its_storm() {
        let h = Harness::new();

        h.orchestrator
            .launch_with_intent(SessionKind::Scroll, 30)
            .await
            .unwrap();
        h.clock.advance_ms(30 * 60_000);
        assert!(h.orchestrator.check_expiry().await);
        assert!(h.orchestrator.is_nudge_active().await);

        h.orchestrator
            .launch_with_intent(SessionKind::Scroll, 15)
            .await
            .unwrap();

        assert!(!h.orchestrator.is_nudge_active().await);
        assert!(!h.orchestrator.storm().has_emitter().await);
        let record = h.orchestrator.timer().record().await;
        assert_eq!(
            record,
            Some(TimerRecord::armed(h.clock.now_ms(), 15 * 60_000))
        );
        let stored = h.timer_and_storm_keys();
        assert_eq!(stored.len(), 3);
        assert!(!stored.contains_key(keys::STORM_ACTIVE));
        h.orchestrator.stop_session().await;
    }

    #[tokio::test]
    async fn supersede_before_expiry_keeps_only_latest_timer() {
        let h = Harness::new();
        h.orchestrator
            .launch_with_intent(SessionKind::Scroll, 20)
            .await
            .unwrap();
        h.clock.advance_ms(60_000);
        h.orchestrator
            .launch_with_intent(SessionKind::Messages, 0)
            .await
            .unwrap();

        assert_eq!(h.orchestrator.remaining_ms().await, 120_000);
        assert_eq!(
            h.orchestrator.session_info().await.kind,
            Some(SessionKind::Messages)
        );
        assert_eq!(h.notifier.sent_count(), 0);
        h.orchestrator.stop_session().await;
    }

    #[tokio::test]
    async fn storage_failure_while_arming_is_an_error_and_disarms() {
        let h = Harness::new();
        h.store.set_fail_writes(true);

        let result = h
            .orchestrator
            .launch_with_intent(SessionKind::Scroll, 10)
            .await;
        assert!(result.is_err());
        assert!(!h.orchestrator.handshake().is_armed().await);
        assert!(h.launcher.opened().is_empty());
        assert_eq!(h.orchestrator.session_info().await, SessionInfo::default());
    }

    #[tokio::test]
    async fn stop_session_is_idempotent() {
        let h = Harness::new();
        h.orchestrator.stop_session().await;
        h.orchestrator
            .launch_with_intent(SessionKind::Scroll, 5)
            .await
            .unwrap();
        h.orchestrator.stop_session().await;
        h.orchestrator.stop_session().await;
        assert!(h.timer_and_storm_keys().is_empty());
        assert_eq!(h.orchestrator.phase().await, SessionPhase::Idle);
    }

    #[tokio::test]
    async fn scroll_ceiling_holds_even_if_settings_allow_more() {
        let h = Harness::with_settings(GuardSettings {
            max_scroll_minutes: 120,
            ..GuardSettings::default()
        });

        let outcome = h
            .orchestrator
            .launch_with_intent(SessionKind::Scroll, 90)
            .await
            .unwrap();
        assert_eq!(outcome, LaunchOutcome::InvalidDuration);
        assert!(h.timer_and_storm_keys().is_empty());

        let outcome = h
            .orchestrator
            .launch_with_intent(SessionKind::Scroll, 60)
            .await
            .unwrap();
        assert!(outcome.is_launched());
        h.orchestrator.stop_session().await;
    }

    #[tokio::test]
    async fn expiry_check_during_stop_does_not_restart_nudges() {
        let h = Harness::new();
        h.orchestrator
            .launch_with_intent(SessionKind::Scroll, 10)
            .await
            .unwrap();
        h.clock.advance_ms(10 * 60_000);

        // Park stop_session inside the campaign teardown.
        h.notifier.hold_badge_clear.store(true, Ordering::SeqCst);
        let stopping = tokio::spawn({
            let orchestrator = h.orchestrator.clone();
            async move { orchestrator.stop_session().await }
        });
        h.notifier.badge_clear_started.notified().await;

        let checking = tokio::spawn({
            let orchestrator = h.orchestrator.clone();
            async move { orchestrator.check_expiry().await }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!checking.is_finished());

        h.notifier.release_badge_clear.notify_one();
        stopping.await.unwrap();
        assert!(!checking.await.unwrap());

        assert!(!h.orchestrator.is_nudge_active().await);
        assert!(!h.orchestrator.storm().has_emitter().await);
        assert_eq!(h.notifier.sent_count(), 0);
        assert_eq!(h.orchestrator.phase().await, SessionPhase::Idle);
    }

    #[derive(Default)]
    struct GatedHandler {
        started: Notify,
        release: Notify,
    }

    #[async_trait]
    impl ExpireHandler for GatedHandler {
        async fn on_expire(&self) {
            self.started.notify_one();
            self.release.notified().await;
        }
    }

    #[tokio::test]
    async fn launch_waits_for_in_flight_expiry_and_keeps_new_record() {
        let h = Harness::new();
        h.orchestrator
            .launch_with_intent(SessionKind::Scroll, 10)
            .await
            .unwrap();
        h.clock.advance_ms(10 * 60_000);

        let handler = Arc::new(GatedHandler::default());
        h.orchestrator.timer().set_expire_handler(handler.clone());

        let firing = tokio::spawn({
            let orchestrator = h.orchestrator.clone();
            async move { orchestrator.check_expiry().await }
        });
        handler.started.notified().await;

        let launching = tokio::spawn({
            let orchestrator = h.orchestrator.clone();
            async move {
                orchestrator
                    .launch_with_intent(SessionKind::Messages, 0)
                    .await
                    .unwrap()
            }
        });
        for _ in 0..10 {
            tokio::task::yield_now().await;
        }
        assert!(!launching.is_finished());

        handler.release.notify_one();
        assert!(firing.await.unwrap());
        assert!(launching.await.unwrap().is_launched());

        assert_eq!(
            h.orchestrator.timer().record().await,
            Some(TimerRecord::armed(h.clock.now_ms(), 120_000))
        );
        assert_eq!(
            h.orchestrator.session_info().await.kind,
            Some(SessionKind::Messages)
        );
        assert_eq!(h.clipboard.contents(), PASS_TOKEN);
        h.orchestrator.stop_session().await;
    }
}
