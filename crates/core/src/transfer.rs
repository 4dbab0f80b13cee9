use serde::{Deserialize, Serialize};

use crate::model::Slot;
use crate::notice::Notice;

/// Phase of the seeker workflow.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransferState {
    Searching,
    HoldingSeekerSlot,
    AwaitingTargetChoice,
    Transferring,
    TransferredOk,
    TransferFailed,
}

impl TransferState {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TransferState::TransferredOk | TransferState::TransferFailed)
    }
}

/// How a transfer sequence ended. Every variant is terminal.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransferOutcome {
    Transferred { target: String, slot: Slot },
    /// No usable answer before the deadline. Seeker reservation kept.
    AnswerTimeout,
    /// Too many unparseable replies. Seeker reservation kept.
    AnswerRejected { reply: String },
    /// The target's existing reservation could not be released. Seeker kept.
    TargetBusy { target: String, reason: String },
    /// Releasing the seeker reservation failed; its state needs a manual check.
    SeekerReleaseFailed { target: String, reason: String },
    /// Seeker released, target not acquired.
    Critical { target: String, slot: Slot, reason: String },
    /// Stopped before any reservation was touched.
    Aborted { target: String, reason: String },
}

impl TransferOutcome {
    pub fn terminal_state(&self) -> TransferState {
        match self {
            TransferOutcome::Transferred { .. } => TransferState::TransferredOk,
            _ => TransferState::TransferFailed,
        }
    }

    /// True when the seeker reservation is known to still be held on the server.
    pub fn seeker_kept(&self) -> bool {
        matches!(
            self,
            TransferOutcome::AnswerTimeout
                | TransferOutcome::AnswerRejected { .. }
                | TransferOutcome::TargetBusy { .. }
                | TransferOutcome::Aborted { .. }
        )
    }

    /// Notice reporting this outcome. `held` is the seeker slot.
    pub fn notice(&self, held: &Slot) -> Notice {
        match self {
            TransferOutcome::Transferred { target, slot } => Notice::TransferSucceeded {
                target: target.clone(),
                slot: slot.clone(),
            },
            TransferOutcome::AnswerTimeout => Notice::AnswerTimeout { slot: held.clone() },
            TransferOutcome::AnswerRejected { reply } => Notice::TransferFailed {
                target: "(none)".into(),
                reason: format!(
                    "no usable answer (last reply '{reply}'); seeker slot {} {} is still held",
                    held.date, held.time
                ),
            },
            TransferOutcome::TargetBusy { target, reason } => Notice::TargetBusy {
                target: target.clone(),
                reason: reason.clone(),
            },
            TransferOutcome::SeekerReleaseFailed { target, reason } => Notice::TransferFailed {
                target: target.clone(),
                reason: format!("could not release seeker slot, check it manually: {reason}"),
            },
            TransferOutcome::Critical { target, slot, reason } => Notice::TransferCritical {
                target: target.clone(),
                slot: slot.clone(),
                reason: reason.clone(),
            },
            TransferOutcome::Aborted { target, reason } => Notice::TransferFailed {
                target: target.clone(),
                reason: reason.clone(),
            },
        }
    }
}
