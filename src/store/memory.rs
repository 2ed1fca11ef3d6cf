use std::{
    collections::HashMap,
    sync::{
        atomic::{AtomicBool, Ordering},
        Mutex,
    },
};

use anyhow::{anyhow, bail, Result};
use async_trait::async_trait;

use super::KeyValueStore;

/// In-process store. Data lives as long as the value does, so sharing one
/// `Arc<MemoryStore>` between two component stacks simulates a restart.
#[derive(Default)]
pub struct MemoryStore {
    data: Mutex<HashMap<String, String>>,
    fail_reads: AtomicBool,
    fail_writes: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_reads(&self, fail: bool) {
        self.fail_reads.store(fail, Ordering::SeqCst);
    }

    pub fn set_fail_writes(&self, fail: bool) {
        self.fail_writes.store(fail, Ordering::SeqCst);
    }

    /// Copy of every entry, for before/after comparisons.
    pub fn snapshot(&self) -> HashMap<String, String> {
        match self.data.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    fn check_read(&self) -> Result<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            bail!("memory store read failure (injected)");
        }
        Ok(())
    }

    fn check_write(&self) -> Result<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            bail!("memory store write failure (injected)");
        }
        Ok(())
    }
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        self.check_read()?;
        let guard = self
            .data
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(guard.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<()> {
        self.check_write()?;
        let mut guard = self
            .data
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        guard.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn remove(&self, key: &str) -> Result<()> {
        self.check_write()?;
        let mut guard = self
            .data
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        guard.remove(key);
        Ok(())
    }

    async fn multi_set(&self, entries: &[(&str, String)]) -> Result<()> {
        self.check_write()?;
        let mut guard = self
            .data
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        for (key, value) in entries {
            guard.insert((*key).to_string(), value.clone());
        }
        Ok(())
    }

    async fn multi_remove(&self, keys: &[&str]) -> Result<()> {
        self.check_write()?;
        let mut guard = self
            .data
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        for key in keys {
            guard.remove(*key);
        }
        Ok(())
    }
}
