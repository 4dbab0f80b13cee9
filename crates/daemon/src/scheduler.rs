use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;
use tcseek_core::MIN_POLL_INTERVAL;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info};

/// Default symmetric jitter applied to every wait, in seconds.
pub const DEFAULT_JITTER_SECS: i64 = 5;

/// What the scheduler should do with a job after a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum TickOutcome {
    Continue,
    /// Tear the job down; it never ticks again.
    Retire,
}

/// A recurring unit of work. Ticks of one job never overlap.
#[async_trait]
pub trait Job: Send + Sync + 'static {
    fn id(&self) -> &str;
    fn interval(&self) -> Duration;
    async fn tick(&self) -> TickOutcome;
}

struct JobHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

/// One timer task per job.
///
/// Each task sleeps, ticks, and sleeps again, so a tick that overruns its
/// deadline delays the next one rather than queueing it. Stop requests are
/// only observed while sleeping; an in-flight tick always runs to completion.
pub struct Scheduler {
    jobs: Mutex<HashMap<String, JobHandle>>,
    floor: Duration,
    jitter_secs: i64,
}

/// `max(floor, base + jitter)`, clamped at zero before the floor applies.
pub fn effective_interval(base: Duration, jitter_secs: i64, floor: Duration) -> Duration {
    let secs = (base.as_secs() as i64).saturating_add(jitter_secs).max(0) as u64;
    Duration::from_secs(secs).max(floor)
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::with_settings(MIN_POLL_INTERVAL, DEFAULT_JITTER_SECS)
    }
}

impl Scheduler {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn with_settings(floor: Duration, jitter_secs: i64) -> Self {
        Self {
            jobs: Mutex::new(HashMap::new()),
            floor,
            jitter_secs: jitter_secs.abs(),
        }
    }

    fn jobs(&self) -> MutexGuard<'_, HashMap<String, JobHandle>> {
        self.jobs.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn next_wait(&self, base: Duration) -> Duration {
        let jitter = if self.jitter_secs == 0 {
            0
        } else {
            rand::rng().random_range(-self.jitter_secs..=self.jitter_secs)
        };
        effective_interval(base, jitter, self.floor)
    }

    /// Starts a timer task for `job`. An existing job with the same id is
    /// replaced.
    pub fn schedule(self: &Arc<Self>, job: Arc<dyn Job>) {
        let id = job.id().to_string();
        let base_secs = job.interval().as_secs();
        let (stop, mut stop_rx) = watch::channel(false);
        let weak = Arc::downgrade(self);
        let task_id = id.clone();

        let task = tokio::spawn(async move {
            loop {
                let wait = match weak.upgrade() {
                    Some(s) => s.next_wait(job.interval()),
                    None => break,
                };
                debug!(job = %task_id, secs = wait.as_secs(), "next tick scheduled");
                tokio::select! {
                    _ = stop_rx.changed() => break,
                    _ = sleep(wait) => {}
                }
                if *stop_rx.borrow() {
                    break;
                }
                if job.tick().await == TickOutcome::Retire {
                    info!(job = %task_id, "job retired");
                    if let Some(s) = weak.upgrade() {
                        s.jobs().remove(&task_id);
                    }
                    break;
                }
            }
            debug!(job = %task_id, "timer task exited");
        });

        info!(job = %id, interval = base_secs, "job scheduled");
        if let Some(old) = self.jobs().insert(id.clone(), JobHandle { stop, task }) {
            info!(job = %id, "replacing existing job");
            let _ = old.stop.send(true);
        }
    }

    /// Stops a job. A missing id is only noted.
    pub fn unschedule(&self, id: &str) -> bool {
        match self.jobs().remove(id) {
            Some(handle) => {
                let _ = handle.stop.send(true);
                info!(job = id, "job unscheduled");
                true
            }
            None => {
                info!(job = id, "no such job to unschedule");
                false
            }
        }
    }

    pub fn is_scheduled(&self, id: &str) -> bool {
        self.jobs().contains_key(id)
    }

    pub fn job_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.jobs().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Cancels all timers and waits for in-flight ticks to finish.
    pub async fn shutdown(&self) {
        let handles: Vec<(String, JobHandle)> = self.jobs().drain().collect();
        info!(jobs = handles.len(), "stopping scheduler");
        for (_, h) in &handles {
            let _ = h.stop.send(true);
        }
        for (id, h) in handles {
            if let Err(e) = h.task.await {
                info!(job = %id, error = %e, "timer task ended abnormally");
            }
        }
        info!("scheduler stopped");
    }
}
