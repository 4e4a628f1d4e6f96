// src/scheduler.rs

use anyhow::{Result, bail};
use futures::future::BoxFuture;
use std::future::Future;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};

type JobFn = Arc<dyn Fn() -> BoxFuture<'static, Result<()>> + Send + Sync>;

struct JobSpec {
    name: String,
    every: Duration,
    run: JobFn,
}

struct Running {
    stop_tx: watch::Sender<bool>,
    handles: Vec<JoinHandle<()>>,
}

/// Interval job scheduler on the tokio runtime. Jobs are added while it is
/// stopped; `start` spawns one task per job, `shutdown` stops and joins them.
pub struct Scheduler {
    timezone: &'static str,
    jobs: Vec<JobSpec>,
    running: Mutex<Option<Running>>,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    pub fn new() -> Self {
        Self {
            timezone: "UTC",
            jobs: Vec::new(),
            running: Mutex::new(None),
        }
    }

    pub fn timezone(&self) -> &'static str {
        self.timezone
    }

    pub fn add_interval_job<F, Fut>(&mut self, name: &str, every: Duration, job: F) -> Result<()>
    where
        F: Fn() -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<()>> + Send + 'static,
    {
        if self.is_running() {
            bail!("cannot add job `{name}` to a running scheduler");
        }
        if every.is_zero() {
            bail!("job `{name}` needs a non-zero interval");
        }
        self.jobs.push(JobSpec {
            name: name.to_string(),
            every,
            run: Arc::new(move || -> BoxFuture<'static, Result<()>> { Box::pin(job()) }),
        });
        Ok(())
    }

    pub fn job_names(&self) -> Vec<&str> {
        self.jobs.iter().map(|j| j.name.as_str()).collect()
    }

    pub fn is_running(&self) -> bool {
        self.running.lock().map(|r| r.is_some()).unwrap_or(false)
    }

    pub fn start(&self) -> Result<()> {
        let mut running = self.running.lock().map_err(|_| anyhow::anyhow!("scheduler lock poisoned"))?;
        if running.is_some() {
            bail!("scheduler already running");
        }
        let (stop_tx, stop_rx) = watch::channel(false);
        let handles = self
            .jobs
            .iter()
            .map(|spec| spawn_job(spec, stop_rx.clone()))
            .collect();
        *running = Some(Running { stop_tx, handles });
        tracing::info!("scheduler started ({} jobs, tz {})", self.jobs.len(), self.timezone);
        Ok(())
    }

    /// Stops all job loops and waits for them. No-op when not running.
    pub async fn shutdown(&self) {
        let running = match self.running.lock() {
            Ok(mut guard) => guard.take(),
            Err(_) => None,
        };
        let Some(Running { stop_tx, handles }) = running else {
            return;
        };
        let _ = stop_tx.send(true);
        for handle in handles {
            if let Err(err) = handle.await {
                tracing::warn!("scheduler job task ended abnormally: {}", err);
            }
        }
        tracing::info!("scheduler stopped");
    }
}

fn spawn_job(spec: &JobSpec, mut stop_rx: watch::Receiver<bool>) -> JoinHandle<()> {
    let name = spec.name.clone();
    let every = spec.every;
    let run = spec.run.clone();
    tokio::spawn(async move {
        let mut ticker = interval_at(Instant::now() + every, every);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = stop_rx.changed() => break,
                _ = ticker.tick() => {
                    if let Err(err) = run().await {
                        tracing::warn!("scheduled job `{}` failed: {:?}", name, err);
                    }
                }
            }
        }
    })
}
