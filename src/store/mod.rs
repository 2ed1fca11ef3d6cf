//! Durable string key/value storage shared by every component.
//!
//! Each component is the only intended writer of its own key namespace
//! (`timer.*`, `storm.*`, `lifecycle.*`), but nothing enforces that and there
//! are no multi-key transactions across namespaces.

mod memory;
mod migrations;
mod sqlite;

use anyhow::{anyhow, Result};
use async_trait::async_trait;

pub use memory::MemoryStore;
pub use sqlite::SqliteStore;

pub mod keys {
    pub const TIMER_STARTED_AT: &str = "timer.started_at_ms";
    pub const TIMER_DURATION: &str = "timer.duration_ms";
    pub const TIMER_ACTIVE: &str = "timer.active";

    pub const STORM_ACTIVE: &str = "storm.active";
    pub const STORM_COUNT: &str = "storm.count";

    pub const LAST_ACTIVE_AT: &str = "lifecycle.last_active_at_ms";
}

#[async_trait]
pub trait KeyValueStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>>;

    async fn set(&self, key: &str, value: &str) -> Result<()>;

    async fn remove(&self, key: &str) -> Result<()>;

    /// Values come back in the same order as `keys`.
    async fn multi_get(&self, keys: &[&str]) -> Result<Vec<Option<String>>> {
        let mut values = Vec::with_capacity(keys.len());
        for key in keys {
            values.push(self.get(key).await?);
        }
        Ok(values)
    }

    async fn multi_set(&self, entries: &[(&str, String)]) -> Result<()> {
        for (key, value) in entries {
            self.set(key, value).await?;
        }
        Ok(())
    }

    async fn multi_remove(&self, keys: &[&str]) -> Result<()> {
        for key in keys {
            self.remove(key).await?;
        }
        Ok(())
    }
}

pub fn flag_value(flag: bool) -> String {
    if flag { "true" } else { "false" }.to_string()
}

pub fn parse_flag(value: Option<&str>) -> bool {
    matches!(value, Some("true"))
}

pub fn parse_i64(value: Option<&str>, field: &str) -> Result<Option<i64>> {
    value
        .map(|raw| {
            raw.parse::<i64>()
                .map_err(|err| anyhow!("invalid {field} value '{raw}': {err}"))
        })
        .transpose()
}
