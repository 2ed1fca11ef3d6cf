use std::cmp;

use anyhow::Result;
use serde::{Deserialize, Serialize};

use crate::store::{flag_value, keys, parse_flag, parse_i64, KeyValueStore};

pub const TIMER_KEYS: [&str; 3] = [
    keys::TIMER_STARTED_AT,
    keys::TIMER_DURATION,
    keys::TIMER_ACTIVE,
];

/// "The user may be away until `started_at_ms + duration_ms`."
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TimerRecord {
    pub started_at_ms: i64,
    pub duration_ms: i64,
    pub active: bool,
}

impl TimerRecord {
    pub fn armed(started_at_ms: i64, duration_ms: i64) -> Self {
        Self {
            started_at_ms,
            duration_ms,
            active: true,
        }
    }

    pub fn elapsed_ms(&self, now_ms: i64) -> i64 {
        now_ms.saturating_sub(self.started_at_ms)
    }

    pub fn is_expired(&self, now_ms: i64) -> bool {
        self.active && self.elapsed_ms(now_ms) >= self.duration_ms
    }

    pub fn remaining_ms(&self, now_ms: i64) -> u64 {
        if !self.active {
            return 0;
        }
        let remaining = self.duration_ms.saturating_sub(self.elapsed_ms(now_ms));
        cmp::max(remaining, 0) as u64
    }

    pub fn entries(&self) -> Vec<(&'static str, String)> {
        vec![
            (keys::TIMER_STARTED_AT, self.started_at_ms.to_string()),
            (keys::TIMER_DURATION, self.duration_ms.to_string()),
            (keys::TIMER_ACTIVE, flag_value(self.active)),
        ]
    }

    /// Reads the persisted record. `None` when nothing is armed, including a
    /// half-written record whose active flag lacks valid numbers.
    pub async fn load(store: &dyn KeyValueStore) -> Result<Option<Self>> {
        let values = store.multi_get(&TIMER_KEYS).await?;
        let started_at = parse_i64(values[0].as_deref(), keys::TIMER_STARTED_AT)?;
        let duration = parse_i64(values[1].as_deref(), keys::TIMER_DURATION)?;
        let active = parse_flag(values[2].as_deref());

        match (active, started_at, duration) {
            (true, Some(started_at_ms), Some(duration_ms)) if duration_ms > 0 => {
                Ok(Some(Self::armed(started_at_ms, duration_ms)))
            }
            _ => Ok(None),
        }
    }
}
