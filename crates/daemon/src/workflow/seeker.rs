use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tcseek_core::{
    BotError, HoldGate, MonitoredTarget, Notice, Preference, TransferOutcome, TransferState,
    SEEKER_ID,
};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::{handle_tick_error, lock_detector, SharedDetector};
use crate::notify::{report, Notifier};
use crate::scheduler::{Job, TickOutcome};
use crate::source::{ensure_session, SlotSource, SourceError};
use crate::transfer::TransferOrchestrator;

/// Polls the seeker section, books the first new matching slot and hands it
/// to the transfer orchestrator.
///
/// Ticks are no-ops while the [`HoldGate`] is held.
pub struct SeekerJob {
    target: MonitoredTarget,
    source: Arc<dyn SlotSource>,
    notifier: Arc<dyn Notifier>,
    detector: SharedDetector,
    gate: HoldGate,
    orchestrator: Arc<TransferOrchestrator>,
    transfer: Mutex<Option<JoinHandle<TransferOutcome>>>,
    /// Set once the user has been told the section is already reserved.
    paused_reported: AtomicBool,
}

impl SeekerJob {
    pub fn new(
        target: MonitoredTarget,
        source: Arc<dyn SlotSource>,
        notifier: Arc<dyn Notifier>,
        detector: SharedDetector,
        gate: HoldGate,
        orchestrator: Arc<TransferOrchestrator>,
    ) -> Self {
        Self {
            target,
            source,
            notifier,
            detector,
            gate,
            orchestrator,
            transfer: Mutex::new(None),
            paused_reported: AtomicBool::new(false),
        }
    }

    pub fn gate(&self) -> &HoldGate {
        &self.gate
    }

    pub fn state(&self) -> TransferState {
        self.orchestrator.state()
    }

    /// Takes the handle of the most recently launched transfer.
    pub fn take_transfer(&self) -> Option<JoinHandle<TransferOutcome>> {
        self.transfer
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .take()
    }

    async fn search(&self) -> Result<(), BotError> {
        ensure_session(&*self.source).await?;
        let view = self
            .source
            .fetch_section(&self.target.page, &self.target.section)
            .await?;

        if let Some(slot) = view.reserved.first() {
            warn!(section = %self.target.section, "seeker section already registered, not searching");
            if !self.paused_reported.swap(true, Ordering::SeqCst) {
                report(&*self.notifier, Notice::SeekerPaused { slot: slot.clone() }).await;
            }
            return Ok(());
        }
        if self.paused_reported.swap(false, Ordering::SeqCst) {
            info!(section = %self.target.section, "seeker section free again, searching resumed");
        }

        let matching = Preference::of(&self.target).filter(&view.available);
        let new_slots = lock_detector(&self.detector).detect(SEEKER_ID, &matching);
        let Some(slot) = new_slots.into_iter().next() else {
            return Ok(());
        };
        info!(date = %slot.date, time = %slot.time, "found matching slot in seeker");

        let Some(permit) = self.gate.try_acquire() else {
            debug!("hold taken by a concurrent tick, skipping");
            return Ok(());
        };

        match self.source.reserve(&slot.action).await {
            Ok(true) => {}
            Ok(false) => {
                report(
                    &*self.notifier,
                    Notice::BookingFailed {
                        target: self.target.name.clone(),
                        slot,
                        reason: "reservation refused".into(),
                    },
                )
                .await;
                return Ok(());
            }
            Err(SourceError::SessionExpired) => return Err(BotError::SessionExpired),
            Err(e) => {
                report(
                    &*self.notifier,
                    Notice::BookingFailed {
                        target: self.target.name.clone(),
                        slot,
                        reason: e.to_string(),
                    },
                )
                .await;
                return Ok(());
            }
        }

        info!(date = %slot.date, time = %slot.time, "booked slot in seeker section");
        self.orchestrator.set_state(TransferState::HoldingSeekerSlot);
        let held = permit.bind(slot, self.target.page.clone(), self.target.section.clone());
        match self.orchestrator.start(held).await {
            Ok(handle) => {
                *self
                    .transfer
                    .lock()
                    .unwrap_or_else(|poisoned| poisoned.into_inner()) = Some(handle);
            }
            Err(e) => {
                report(
                    &*self.notifier,
                    Notice::Error {
                        context: "asking for transfer target (seeker slot still booked)".into(),
                        message: e.to_string(),
                    },
                )
                .await;
            }
        }
        Ok(())
    }
}

#[async_trait]
impl Job for SeekerJob {
    fn id(&self) -> &str {
        SEEKER_ID
    }

    fn interval(&self) -> Duration {
        self.target.interval
    }

    async fn tick(&self) -> TickOutcome {
        if self.gate.is_held() {
            debug!("holding seeker slot, waiting for transfer");
            return TickOutcome::Continue;
        }
        debug!(section = %self.target.section, "checking seeker");
        if let Err(e) = self.search().await {
            handle_tick_error(&*self.source, &*self.notifier, "seeker", e).await;
        }
        TickOutcome::Continue
    }
}
