//! Relocating the held seeker reservation into a chosen target section.
//!
//! The participant can hold one reservation at a time, so the seeker slot is
//! released before the target slot is booked. Between those two calls the
//! participant holds nothing; the target is re-fetched and booked immediately.

use std::sync::Arc;

use tcseek_core::{
    format_question, resolve_target, HeldReservation, MonitoredTarget, Notice, ResolveContext,
    Slot, TransferOutcome, TransferState, TransferTarget,
};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use crate::channel::{ChannelError, InteractiveChannel, PendingQuestion};
use crate::config::TransferSettings;
use crate::notify::{report, Notifier};
use crate::source::{ensure_session, SlotSource};

const NO_TARGET: &str = "(none)";

pub struct TransferOrchestrator {
    source: Arc<dyn SlotSource>,
    channel: Arc<dyn InteractiveChannel>,
    notifier: Arc<dyn Notifier>,
    seeker: MonitoredTarget,
    targets: Vec<TransferTarget>,
    settings: TransferSettings,
    state: watch::Sender<TransferState>,
}

impl TransferOrchestrator {
    pub fn new(
        source: Arc<dyn SlotSource>,
        channel: Arc<dyn InteractiveChannel>,
        notifier: Arc<dyn Notifier>,
        seeker: MonitoredTarget,
        targets: Vec<TransferTarget>,
        settings: TransferSettings,
    ) -> Self {
        let (state, _) = watch::channel(TransferState::Searching);
        Self {
            source,
            channel,
            notifier,
            seeker,
            targets,
            settings,
            state,
        }
    }

    pub fn state(&self) -> TransferState {
        *self.state.borrow()
    }

    pub(crate) fn set_state(&self, next: TransferState) {
        let prev = self.state.send_replace(next);
        if prev != next {
            debug!(from = ?prev, to = ?next, "transfer state");
        }
    }

    /// Posts the target question and launches the transfer task.
    ///
    /// If the question cannot be posted the reservation handle is dropped,
    /// which releases the hold; the physical reservation stays.
    pub async fn start(
        self: &Arc<Self>,
        held: HeldReservation,
    ) -> Result<JoinHandle<TransferOutcome>, ChannelError> {
        let prompt = format_question(&self.seeker.section, &held.slot, &self.targets);
        let question = match self.channel.ask(&prompt).await {
            Ok(q) => q,
            Err(e) => {
                self.set_state(TransferState::Searching);
                return Err(e);
            }
        };
        self.set_state(TransferState::AwaitingTargetChoice);
        let this = Arc::clone(self);
        Ok(tokio::spawn(async move { this.run(held, question).await }))
    }

    async fn run(&self, held: HeldReservation, question: PendingQuestion) -> TransferOutcome {
        let outcome = match self.await_choice(question).await {
            Ok(target) => {
                self.set_state(TransferState::Transferring);
                self.relocate(&held, &target).await
            }
            Err(outcome) => outcome,
        };

        self.set_state(outcome.terminal_state());
        report(&*self.notifier, outcome.notice(&held.slot)).await;
        if outcome.seeker_kept() {
            info!(date = %held.slot.date, time = %held.slot.time, "seeker reservation left in place");
        }
        drop(held);
        self.set_state(TransferState::Searching);
        outcome
    }

    /// Waits for a usable reply. One deadline covers every retry.
    async fn await_choice(&self, mut question: PendingQuestion) -> Result<TransferTarget, TransferOutcome> {
        let deadline = Instant::now() + self.settings.answer_timeout;
        let ctx = ResolveContext {
            targets: &self.targets,
            default_section: self.settings.default_section.as_deref(),
        };
        info!(
            question = %question.id(),
            timeout_secs = self.settings.answer_timeout.as_secs(),
            "waiting for target choice"
        );

        let mut rejected = 0u32;
        loop {
            let reply = match question.next_answer(deadline).await {
                Ok(r) => r,
                Err(ChannelError::Timeout) => {
                    warn!("no target choice before the deadline");
                    return Err(TransferOutcome::AnswerTimeout);
                }
                Err(e) => {
                    return Err(TransferOutcome::Aborted {
                        target: NO_TARGET.into(),
                        reason: format!("answer channel failed: {e}"),
                    });
                }
            };

            match resolve_target(&reply, &ctx) {
                Ok(resolved) => {
                    info!(tc = %resolved.target.name, via = ?resolved.via, "target chosen");
                    return Ok(resolved.target);
                }
                Err(e) => {
                    report(
                        &*self.notifier,
                        Notice::AnswerUnparseable {
                            reply: reply.clone(),
                            reason: e.to_string(),
                        },
                    )
                    .await;
                    if rejected >= self.settings.answer_retries {
                        return Err(TransferOutcome::AnswerRejected { reply });
                    }
                    rejected += 1;
                }
            }
        }
    }

    async fn relocate(&self, held: &HeldReservation, target: &TransferTarget) -> TransferOutcome {
        let name = target.name.clone();
        report(&*self.notifier, Notice::TransferStarted { target: name.clone() }).await;
        let aborted = |reason: String| TransferOutcome::Aborted {
            target: name.clone(),
            reason,
        };

        if let Err(e) = ensure_session(&*self.source).await {
            return aborted(format!("session unavailable: {e}"));
        }

        // Find the seeker's release action before touching anything.
        let seeker_view = match self.source.fetch_section(&held.page, &held.section).await {
            Ok(v) => v,
            Err(e) => return aborted(format!("could not read seeker section: {e}")),
        };
        let Some(seeker_reservation) = find_reservation(&seeker_view.reserved, &held.slot) else {
            return aborted("seeker reservation not found".into());
        };

        let target_view = match self.source.fetch_section(&target.page, &target.section).await {
            Ok(v) => v,
            Err(e) => return aborted(format!("could not read target section: {e}")),
        };
        for existing in &target_view.reserved {
            info!(tc = %name, date = %existing.date, time = %existing.time, "releasing existing target reservation");
            match self.source.release(&existing.action).await {
                Ok(true) => {}
                Ok(false) => {
                    return TransferOutcome::TargetBusy {
                        target: name,
                        reason: format!("release of {} {} refused", existing.date, existing.time),
                    }
                }
                Err(e) => {
                    return TransferOutcome::TargetBusy {
                        target: name,
                        reason: e.to_string(),
                    }
                }
            }
        }

        match self.source.release(&seeker_reservation.action).await {
            Ok(true) => info!("seeker slot released"),
            Ok(false) => {
                return TransferOutcome::SeekerReleaseFailed {
                    target: name,
                    reason: "release refused".into(),
                }
            }
            Err(e) => {
                return TransferOutcome::SeekerReleaseFailed {
                    target: name,
                    reason: e.to_string(),
                }
            }
        }

        // Holding nothing from here until the reservation below succeeds.
        let critical = |reason: String| {
            error!(tc = %name, %reason, "seeker released but target not acquired");
            TransferOutcome::Critical {
                target: name.clone(),
                slot: held.slot.clone(),
                reason,
            }
        };
        let slot = match self.source.find_slot(&target.page, &target.section, &held.slot).await {
            Ok(Some(s)) => s,
            Ok(None) => {
                return critical(format!(
                    "{} {} not offered in target section",
                    held.slot.date, held.slot.time
                ))
            }
            Err(e) => return critical(format!("could not re-read target section: {e}")),
        };
        match self.source.reserve(&slot.action).await {
            Ok(true) => {
                info!(tc = %name, date = %slot.date, time = %slot.time, "transfer complete");
                TransferOutcome::Transferred {
                    target: name.clone(),
                    slot,
                }
            }
            Ok(false) => critical("target reservation refused".into()),
            Err(e) => critical(e.to_string()),
        }
    }
}

/// The reserved entry matching `held` by start, or the only one present.
fn find_reservation<'a>(reserved: &'a [Slot], held: &Slot) -> Option<&'a Slot> {
    reserved
        .iter()
        .find(|s| s.same_start(held))
        .or(match reserved {
            [only] => Some(only),
            _ => None,
        })
}
