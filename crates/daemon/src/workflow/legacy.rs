use std::sync::Mutex;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tcseek_core::{BotError, MonitoredTarget, Notice, Preference, TargetState};
use tracing::{debug, info, warn};

use super::{handle_tick_error, lock_detector, SharedDetector};
use crate::notify::{report, Notifier};
use crate::scheduler::{Job, TickOutcome};
use crate::source::{ensure_session, SlotSource, SourceError};

/// One independently polled page that books directly and retires once booked.
pub struct LegacyJob {
    job_id: String,
    target: MonitoredTarget,
    source: Arc<dyn SlotSource>,
    notifier: Arc<dyn Notifier>,
    detector: SharedDetector,
    state: Mutex<TargetState>,
}

impl LegacyJob {
    pub fn new(
        target: MonitoredTarget,
        source: Arc<dyn SlotSource>,
        notifier: Arc<dyn Notifier>,
        detector: SharedDetector,
    ) -> Self {
        Self {
            job_id: format!("tc_{}", target.id),
            target,
            source,
            notifier,
            detector,
            state: Mutex::new(TargetState::Active),
        }
    }

    pub fn state(&self) -> TargetState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    fn mark_booked(&self) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = TargetState::Booked;
    }

    async fn check(&self) -> Result<TargetState, BotError> {
        ensure_session(&*self.source).await?;
        let view = self
            .source
            .fetch_section(&self.target.page, &self.target.section)
            .await?;

        if view.is_reserved() {
            info!(tc = %self.target.name, "already booked, stopping monitoring");
            return Ok(TargetState::Booked);
        }

        let matching = Preference::of(&self.target).filter(&view.available);
        let new_slots = lock_detector(&self.detector).detect(&self.target.id, &matching);
        if new_slots.is_empty() {
            return Ok(TargetState::Active);
        }

        info!(tc = %self.target.name, count = new_slots.len(), "found new matching slots");
        report(
            &*self.notifier,
            Notice::SlotsFound {
                target: self.target.name.clone(),
                slots: new_slots.clone(),
            },
        )
        .await;

        for slot in new_slots {
            let reason = match self.source.reserve(&slot.action).await {
                Ok(true) => {
                    report(
                        &*self.notifier,
                        Notice::BookingSucceeded {
                            target: self.target.name.clone(),
                            slot,
                        },
                    )
                    .await;
                    return Ok(TargetState::Booked);
                }
                Ok(false) => "reservation refused".to_string(),
                Err(SourceError::SessionExpired) => return Err(BotError::SessionExpired),
                Err(e) => e.to_string(),
            };
            warn!(date = %slot.date, time = %slot.time, %reason, "failed to book slot");
            report(
                &*self.notifier,
                Notice::BookingFailed {
                    target: self.target.name.clone(),
                    slot,
                    reason,
                },
            )
            .await;
        }
        Ok(TargetState::Active)
    }
}

#[async_trait]
impl Job for LegacyJob {
    fn id(&self) -> &str {
        &self.job_id
    }

    fn interval(&self) -> Duration {
        self.target.interval
    }

    async fn tick(&self) -> TickOutcome {
        if self.state() == TargetState::Booked {
            debug!(tc = %self.target.name, "already booked, skipping");
            return TickOutcome::Retire;
        }
        debug!(tc = %self.target.name, "checking page");
        match self.check().await {
            Ok(TargetState::Booked) => {
                self.mark_booked();
                TickOutcome::Retire
            }
            Ok(TargetState::Active) => TickOutcome::Continue,
            Err(e) => {
                handle_tick_error(&*self.source, &*self.notifier, &self.target.name, e).await;
                TickOutcome::Continue
            }
        }
    }
}
