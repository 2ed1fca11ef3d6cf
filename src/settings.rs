use std::{fs, path::PathBuf, sync::RwLock, time::Duration};

use anyhow::{anyhow, Context, Result};
use serde::{Deserialize, Serialize};

/// Hard ceiling for a scroll session, whatever `settings.json` says.
pub const MAX_SCROLL_MINUTES: u32 = 60;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default, rename_all = "camelCase")]
pub struct GuardSettings {
    /// Scheme checked for reachability before a session is armed.
    pub target_scheme: String,
    pub messages_url: String,
    pub scroll_url: String,
    pub messages_minutes: u32,
    pub max_scroll_minutes: u32,
    pub storm_interval_secs: u64,
    pub poll_interval_secs: u64,
    pub background_interval_secs: u64,
    pub notifier_timeout_secs: u64,
    /// Schemes the desktop launcher treats as installed.
    pub reachable_schemes: Vec<String>,
}

impl Default for GuardSettings {
    fn default() -> Self {
        Self {
            target_scheme: "instagram://".into(),
            messages_url: "instagram://direct-inbox".into(),
            scroll_url: "instagram://app".into(),
            messages_minutes: 2,
            max_scroll_minutes: 60,
            storm_interval_secs: 5,
            poll_interval_secs: 5,
            background_interval_secs: 15 * 60,
            notifier_timeout_secs: 10,
            reachable_schemes: vec!["instagram://".into()],
        }
    }
}

impl GuardSettings {
    /// Pulls hand-edited values back into range. Returns whether anything
    /// changed.
    pub fn sanitize(&mut self) -> bool {
        let max_scroll = self.max_scroll_minutes.clamp(1, MAX_SCROLL_MINUTES);
        let messages = self.messages_minutes.max(1);
        let changed = max_scroll != self.max_scroll_minutes || messages != self.messages_minutes;
        self.max_scroll_minutes = max_scroll;
        self.messages_minutes = messages;
        changed
    }

    pub fn apply_debug_override(&mut self) {
        let debug_mode = std::env::var("SCROLLGUARD_DEBUG")
            .map(|value| value == "1" || value.eq_ignore_ascii_case("true"))
            .unwrap_or(false);

        if debug_mode {
            self.poll_interval_secs = 1;
        }
    }

    pub fn storm_interval(&self) -> Duration {
        Duration::from_secs(self.storm_interval_secs.max(1))
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs.max(1))
    }

    pub fn background_interval(&self) -> Duration {
        Duration::from_secs(self.background_interval_secs.max(1))
    }

    pub fn notifier_timeout(&self) -> Duration {
        Duration::from_secs(self.notifier_timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default, rename_all = "camelCase")]
struct UserSettings {
    guard: GuardSettings,
}

pub struct SettingsStore {
    path: PathBuf,
    data: RwLock<UserSettings>,
}

impl SettingsStore {
    pub fn new(path: PathBuf) -> Result<Self> {
        let data = if path.exists() {
            let contents = fs::read_to_string(&path)
                .with_context(|| format!("Failed to read settings from {}", path.display()))?;
            serde_json::from_str(&contents).unwrap_or_default()
        } else {
            UserSettings::default()
        };

        Ok(Self {
            path,
            data: RwLock::new(data),
        })
    }

    pub fn guard(&self) -> GuardSettings {
        match self.data.read() {
            Ok(guard) => guard.guard.clone(),
            Err(poisoned) => poisoned.into_inner().guard.clone(),
        }
    }

    pub fn update_guard(&self, settings: GuardSettings) -> Result<()> {
        let mut guard = self
            .data
            .write()
            .map_err(|_| anyhow!("settings lock poisoned"))?;
        guard.guard = settings;
        self.persist(&guard)
    }

    fn persist(&self, data: &UserSettings) -> Result<()> {
        let serialized = serde_json::to_string_pretty(data)?;
        fs::write(&self.path, serialized)
            .with_context(|| format!("Failed to write settings to {}", self.path.display()))
    }
}
