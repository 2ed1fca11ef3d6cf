pub mod clock;
pub mod handshake;
pub mod lifecycle;
pub mod platform;
pub mod session;
pub mod settings;
pub mod store;
pub mod storm;
pub mod timer;
mod utils;

#[cfg(test)]
mod testing;

use std::{path::PathBuf, sync::Arc};

use anyhow::{anyhow, bail, Context, Result};
use log::{info, warn};
use tokio::{
    io::{AsyncBufReadExt, AsyncWriteExt, BufReader},
    sync::mpsc,
};

use clock::{Clock, SystemClock};
use handshake::HandshakeToken;
use lifecycle::{AppLifecycle, AppPhase, LifecycleDeps};
use platform::{
    AppLauncher, BackgroundScheduler, Clipboard, LogNotifier, Notifier, SystemLauncher,
    TokioScheduler,
};
use session::{commands, SessionKind, SessionOrchestrator, StartStormOnExpire};
use settings::{GuardSettings, SettingsStore};
use store::{KeyValueStore, SqliteStore};
use storm::{NotificationStorm, StormConfig};
use timer::BackgroundTimer;

/// Host-provided adapters everything else is built on.
pub struct Platform {
    pub store: Arc<dyn KeyValueStore>,
    pub clipboard: Arc<dyn Clipboard>,
    pub notifier: Arc<dyn Notifier>,
    pub launcher: Arc<dyn AppLauncher>,
    pub scheduler: Arc<dyn BackgroundScheduler>,
    pub clock: Arc<dyn Clock>,
}

/// Fully wired core: one orchestrator for the UI and one lifecycle
/// coordinator for the host's foreground/background events.
pub struct ScrollGuard {
    orchestrator: Arc<SessionOrchestrator>,
    lifecycle: AppLifecycle,
}

impl ScrollGuard {
    pub fn new(platform: Platform, settings: &GuardSettings) -> Self {
        let storm = NotificationStorm::new(
            platform.store.clone(),
            platform.notifier.clone(),
            StormConfig::from_settings(settings),
        );
        let timer = BackgroundTimer::new(
            platform.store.clone(),
            platform.clock.clone(),
            settings.poll_interval(),
            Arc::new(StartStormOnExpire::new(storm.clone())),
        );
        let handshake = HandshakeToken::new(platform.clipboard.clone());

        let orchestrator = Arc::new(SessionOrchestrator::new(
            timer.clone(),
            storm.clone(),
            handshake.clone(),
            platform.launcher.clone(),
            platform.clock.clone(),
            settings.clone(),
        ));
        let lifecycle = AppLifecycle::new(LifecycleDeps {
            timer,
            storm,
            handshake,
            store: platform.store,
            notifier: platform.notifier,
            scheduler: platform.scheduler,
            clock: platform.clock,
            background_interval: settings.background_interval(),
            notifier_timeout: settings.notifier_timeout(),
        });

        Self {
            orchestrator,
            lifecycle,
        }
    }

    pub fn orchestrator(&self) -> &Arc<SessionOrchestrator> {
        &self.orchestrator
    }

    pub fn lifecycle(&self) -> &AppLifecycle {
        &self.lifecycle
    }
}

#[derive(Debug, PartialEq, Eq)]
enum HostCommand {
    Messages,
    Scroll(u32),
    Stop,
    Status,
    Phase(AppPhase),
    Quit,
}

fn parse_command(line: &str) -> Result<Option<HostCommand>> {
    let mut parts = line.split_whitespace();
    let Some(verb) = parts.next() else {
        return Ok(None);
    };

    let command = match verb.to_ascii_lowercase().as_str() {
        "messages" => HostCommand::Messages,
        "scroll" => {
            let minutes = parts
                .next()
                .ok_or_else(|| anyhow!("usage: scroll <minutes>"))?
                .parse::<u32>()
                .context("minutes must be a whole number")?;
            HostCommand::Scroll(minutes)
        }
        "stop" => HostCommand::Stop,
        "status" => HostCommand::Status,
        "foreground" => HostCommand::Phase(AppPhase::Foreground),
        "background" => HostCommand::Phase(AppPhase::Background),
        "quit" | "exit" => HostCommand::Quit,
        other => bail!("unknown command: {other}"),
    };
    Ok(Some(command))
}

fn data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var("SCROLLGUARD_DATA_DIR") {
        return Ok(PathBuf::from(dir));
    }
    dirs::data_dir()
        .map(|dir| dir.join("scrollguard"))
        .ok_or_else(|| anyhow!("no data directory available; set SCROLLGUARD_DATA_DIR"))
}

/// Loads `settings.json`, writing back any values that had to be pulled
/// into range.
fn load_settings(path: PathBuf) -> Result<GuardSettings> {
    let settings_store = SettingsStore::new(path)?;
    let mut settings = settings_store.guard();
    if settings.sanitize() {
        warn!(
            "Settings out of range, using max scroll {} min and messages {} min",
            settings.max_scroll_minutes, settings.messages_minutes
        );
        settings_store.update_guard(settings.clone())?;
    }
    Ok(settings)
}

#[cfg(feature = "desktop")]
fn host_clipboard() -> Arc<dyn Clipboard> {
    Arc::new(platform::SystemClipboard::new())
}

#[cfg(not(feature = "desktop"))]
fn host_clipboard() -> Arc<dyn Clipboard> {
    Arc::new(platform::LocalClipboard::new())
}

async fn reply(stdout: &mut tokio::io::Stdout, line: &str) -> Result<()> {
    stdout.write_all(line.as_bytes()).await?;
    stdout.write_all(b"\n").await?;
    stdout.flush().await?;
    Ok(())
}

async fn host_loop(guard: ScrollGuard, events: mpsc::UnboundedSender<AppPhase>) -> Result<()> {
    let orchestrator = guard.orchestrator().clone();
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdout = tokio::io::stdout();

    while let Some(line) = lines.next_line().await? {
        let command = match parse_command(&line) {
            Ok(Some(command)) => command,
            Ok(None) => continue,
            Err(err) => {
                reply(&mut stdout, &format!("error: {err:#}")).await?;
                continue;
            }
        };

        let response = match command {
            HostCommand::Messages => {
                commands::launch_with_intent(&orchestrator, SessionKind::Messages, 0)
                    .await
                    .map(|launched| format!("launched: {launched}"))
            }
            HostCommand::Scroll(minutes) => {
                commands::launch_with_intent(&orchestrator, SessionKind::Scroll, minutes)
                    .await
                    .map(|launched| format!("launched: {launched}"))
            }
            HostCommand::Stop => commands::stop_session(&orchestrator)
                .await
                .map(|_| "stopped".to_string()),
            HostCommand::Status => commands::get_session_snapshot(&orchestrator)
                .await
                .and_then(|snapshot| {
                    serde_json::to_string(&snapshot).map_err(|err| err.to_string())
                }),
            HostCommand::Phase(phase) => events
                .send(phase)
                .map(|_| format!("{phase:?}").to_lowercase())
                .map_err(|err| err.to_string()),
            HostCommand::Quit => break,
        };

        match response {
            Ok(text) => reply(&mut stdout, &text).await?,
            Err(err) => reply(&mut stdout, &format!("error: {err}")).await?,
        }
    }

    guard.lifecycle().teardown().await;
    Ok(())
}

pub fn run() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Info)
        .init();

    info!("ScrollGuard starting up...");

    let app_data_dir = data_dir()?;
    std::fs::create_dir_all(&app_data_dir)
        .with_context(|| format!("failed to create {}", app_data_dir.display()))?;

    let mut settings = load_settings(app_data_dir.join("settings.json"))?;
    settings.apply_debug_override();

    let store = SqliteStore::new(app_data_dir.join("scrollguard.sqlite3"))?;

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    runtime.block_on(async move {
        let platform = Platform {
            store: Arc::new(store),
            clipboard: host_clipboard(),
            notifier: Arc::new(LogNotifier::new()),
            launcher: Arc::new(SystemLauncher::new(settings.reachable_schemes.clone())),
            scheduler: Arc::new(TokioScheduler::new()),
            clock: Arc::new(SystemClock),
        };
        let guard = ScrollGuard::new(platform, &settings);

        let (events_tx, events_rx) = mpsc::unbounded_channel();
        guard.lifecycle().init(events_rx).await;

        if let Err(err) = host_loop(guard, events_tx).await {
            warn!("Host loop ended with error: {err:#}");
            return Err(err);
        }
        info!("ScrollGuard shutting down");
        Ok(())
    })
}
