//! The two operating modes as scheduler jobs. Exactly one is built per process.

mod legacy;
mod seeker;

use std::sync::{Arc, Mutex};

pub use legacy::LegacyJob;
pub use seeker::SeekerJob;

use tcseek_core::{BotError, ChangeDetector, HoldGate, Notice, TransferState};
use tracing::{error, info, warn};

use crate::channel::InteractiveChannel;
use crate::config::Mode;
use crate::notify::{report, Notifier};
use crate::scheduler::{Job, Scheduler};
use crate::source::SlotSource;
use crate::transfer::TransferOrchestrator;

/// Change detector shared by every job of a workflow.
pub type SharedDetector = Arc<Mutex<ChangeDetector>>;

pub enum Workflow {
    Seeker(Arc<SeekerJob>),
    Legacy(Vec<Arc<LegacyJob>>),
}

impl Workflow {
    pub fn build(
        mode: Mode,
        source: Arc<dyn SlotSource>,
        channel: Arc<dyn InteractiveChannel>,
        notifier: Arc<dyn Notifier>,
    ) -> Self {
        let detector: SharedDetector = Arc::default();
        match mode {
            Mode::Seeker {
                seeker,
                targets,
                transfer,
            } => {
                let orchestrator = Arc::new(TransferOrchestrator::new(
                    Arc::clone(&source),
                    channel,
                    Arc::clone(&notifier),
                    seeker.clone(),
                    targets,
                    transfer,
                ));
                Workflow::Seeker(Arc::new(SeekerJob::new(
                    seeker,
                    source,
                    notifier,
                    detector,
                    HoldGate::new(),
                    orchestrator,
                )))
            }
            Mode::Legacy { targets } => Workflow::Legacy(
                targets
                    .into_iter()
                    .map(|t| {
                        Arc::new(LegacyJob::new(
                            t,
                            Arc::clone(&source),
                            Arc::clone(&notifier),
                            Arc::clone(&detector),
                        ))
                    })
                    .collect(),
            ),
        }
    }

    pub fn jobs(&self) -> Vec<Arc<dyn Job>> {
        match self {
            Workflow::Seeker(job) => vec![Arc::clone(job) as Arc<dyn Job>],
            Workflow::Legacy(jobs) => jobs.iter().map(|j| Arc::clone(j) as Arc<dyn Job>).collect(),
        }
    }

    pub fn schedule(&self, scheduler: &Arc<Scheduler>) {
        for job in self.jobs() {
            scheduler.schedule(job);
        }
    }

    /// Runs one tick of every job, in order.
    pub async fn run_once(&self) {
        for job in self.jobs() {
            info!(job = job.id(), "running single tick");
            job.tick().await;
        }
    }

    /// Phase of a seeker transfer that has not run to completion, if any.
    pub fn in_flight_transfer(&self) -> Option<TransferState> {
        match self {
            Workflow::Seeker(job) => {
                let state = job.state();
                (job.gate().is_held() || state != TransferState::Searching).then_some(state)
            }
            Workflow::Legacy(_) => None,
        }
    }

    /// Reports a transfer abandoned by shutdown. Returns true when one was.
    pub async fn report_interrupted(&self, notifier: &dyn Notifier) -> bool {
        let Some(state) = self.in_flight_transfer() else {
            return false;
        };
        error!(?state, "shutting down with seeker transfer unfinished");
        report(
            notifier,
            Notice::Error {
                context: "shutdown".into(),
                message: format!(
                    "shutdown during {state:?}; check the seeker and target reservations manually"
                ),
            },
        )
        .await;
        true
    }
}

/// Tick-boundary error policy: an expired session is re-established for the
/// next tick, everything else is reported. Nothing propagates.
pub(crate) async fn handle_tick_error(
    source: &dyn SlotSource,
    notifier: &dyn Notifier,
    target: &str,
    err: BotError,
) {
    match err {
        BotError::SessionExpired => {
            warn!(tc = target, "session expired during check, re-authenticating for next tick");
            if let Err(e) = source.authenticate().await {
                report(
                    notifier,
                    Notice::Error {
                        context: format!("re-authenticating for {target}"),
                        message: e.to_string(),
                    },
                )
                .await;
            }
        }
        other => {
            report(
                notifier,
                Notice::Error {
                    context: format!("checking {target}"),
                    message: other.to_string(),
                },
            )
            .await;
        }
    }
}

pub(crate) fn lock_detector(detector: &SharedDetector) -> std::sync::MutexGuard<'_, ChangeDetector> {
    detector.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}
