use std::{
    collections::HashMap,
    sync::{Arc, Mutex},
    time::Duration,
};

use anyhow::{anyhow, Result};
use log::info;
use tokio::time::{self, Instant, MissedTickBehavior};
use tokio_util::sync::CancellationToken;

use super::{BackgroundJob, BackgroundScheduler};

/// Stand-in for an OS background-fetch scheduler: each job runs on a tokio
/// interval until unregistered. The first run happens one interval after
/// registration, like the platform schedulers it replaces.
#[derive(Default)]
pub struct TokioScheduler {
    jobs: Mutex<HashMap<String, CancellationToken>>,
}

impl TokioScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn registered(&self) -> Vec<String> {
        match self.jobs.lock() {
            Ok(guard) => guard.keys().cloned().collect(),
            Err(poisoned) => poisoned.into_inner().keys().cloned().collect(),
        }
    }
}

impl BackgroundScheduler for TokioScheduler {
    fn register(
        &self,
        name: &str,
        min_interval: Duration,
        job: Arc<dyn BackgroundJob>,
    ) -> Result<()> {
        if min_interval.is_zero() {
            return Err(anyhow!("background task {name} needs a non-zero interval"));
        }

        let cancel_token = CancellationToken::new();
        let token = cancel_token.clone();
        let task_name = name.to_string();

        tokio::spawn(async move {
            let mut ticker = time::interval_at(Instant::now() + min_interval, min_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    _ = ticker.tick() => job.run().await,
                    _ = token.cancelled() => {
                        info!("Background task {task_name} stopped");
                        break;
                    }
                }
            }
        });

        let mut jobs = self
            .jobs
            .lock()
            .map_err(|_| anyhow!("scheduler lock poisoned"))?;
        if let Some(previous) = jobs.insert(name.to_string(), cancel_token) {
            previous.cancel();
        }
        info!("Registered background task {name} every {}s", min_interval.as_secs());
        Ok(())
    }

    fn unregister(&self, name: &str) {
        let removed = match self.jobs.lock() {
            Ok(mut guard) => guard.remove(name),
            Err(poisoned) => poisoned.into_inner().remove(name),
        };
        if let Some(token) = removed {
            token.cancel();
        }
    }
}

impl Drop for TokioScheduler {
    fn drop(&mut self) {
        let jobs = match self.jobs.get_mut() {
            Ok(jobs) => jobs,
            Err(poisoned) => poisoned.into_inner(),
        };
        for token in jobs.values() {
            token.cancel();
        }
    }
}
