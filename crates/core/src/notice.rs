//! User-facing notices and the interactive target question.
//!
//! Everything here renders to Telegram-flavoured HTML. Dynamic text is escaped.

use std::fmt::Write as _;

use serde::{Deserialize, Serialize};

use crate::model::{Slot, TransferTarget};
use crate::util::escape_html;

/// How loudly a notice should be logged.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

/// Stable discriminant of a [`Notice`], used in logs and tests.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NoticeKind {
    MonitoringStarted,
    SlotsFound,
    BookingSucceeded,
    BookingFailed,
    TransferStarted,
    TransferSucceeded,
    TransferFailed,
    TransferCritical,
    TargetBusy,
    AnswerTimeout,
    AnswerUnparseable,
    SeekerPaused,
    Error,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum Notice {
    MonitoringStarted { targets: usize },
    SlotsFound { target: String, slots: Vec<Slot> },
    BookingSucceeded { target: String, slot: Slot },
    BookingFailed { target: String, slot: Slot, reason: String },
    TransferStarted { target: String },
    TransferSucceeded { target: String, slot: Slot },
    TransferFailed { target: String, reason: String },
    /// Seeker slot released, target slot not acquired.
    TransferCritical { target: String, slot: Slot, reason: String },
    TargetBusy { target: String, reason: String },
    AnswerTimeout { slot: Slot },
    AnswerUnparseable { reply: String, reason: String },
    /// The seeker section holds a reservation, so no further slot is booked
    /// there until it is released.
    SeekerPaused { slot: Slot },
    Error { context: String, message: String },
}

impl Notice {
    pub fn kind(&self) -> NoticeKind {
        match self {
            Notice::MonitoringStarted { .. } => NoticeKind::MonitoringStarted,
            Notice::SlotsFound { .. } => NoticeKind::SlotsFound,
            Notice::BookingSucceeded { .. } => NoticeKind::BookingSucceeded,
            Notice::BookingFailed { .. } => NoticeKind::BookingFailed,
            Notice::TransferStarted { .. } => NoticeKind::TransferStarted,
            Notice::TransferSucceeded { .. } => NoticeKind::TransferSucceeded,
            Notice::TransferFailed { .. } => NoticeKind::TransferFailed,
            Notice::TransferCritical { .. } => NoticeKind::TransferCritical,
            Notice::TargetBusy { .. } => NoticeKind::TargetBusy,
            Notice::AnswerTimeout { .. } => NoticeKind::AnswerTimeout,
            Notice::AnswerUnparseable { .. } => NoticeKind::AnswerUnparseable,
            Notice::SeekerPaused { .. } => NoticeKind::SeekerPaused,
            Notice::Error { .. } => NoticeKind::Error,
        }
    }

    pub fn severity(&self) -> Severity {
        match self.kind() {
            NoticeKind::TransferCritical => Severity::Critical,
            NoticeKind::BookingFailed | NoticeKind::TransferFailed | NoticeKind::Error => {
                Severity::Error
            }
            NoticeKind::TargetBusy
            | NoticeKind::AnswerTimeout
            | NoticeKind::AnswerUnparseable
            | NoticeKind::SeekerPaused => Severity::Warning,
            _ => Severity::Info,
        }
    }

    /// One-line plain summary for logs.
    pub fn summary(&self) -> String {
        match self {
            Notice::MonitoringStarted { targets } => format!("monitoring {targets} page(s)"),
            Notice::SlotsFound { target, slots } => {
                format!("{} new slot(s) in {target}", slots.len())
            }
            Notice::BookingSucceeded { target, slot } => {
                format!("booked {} {} in {target}", slot.date, slot.time)
            }
            Notice::BookingFailed { target, slot, reason } => {
                format!("booking {} {} in {target} failed: {reason}", slot.date, slot.time)
            }
            Notice::TransferStarted { target } => format!("transfer to {target} started"),
            Notice::TransferSucceeded { target, slot } => {
                format!("transferred {} {} to {target}", slot.date, slot.time)
            }
            Notice::TransferFailed { target, reason } => {
                format!("transfer to {target} failed: {reason}")
            }
            Notice::TransferCritical { target, slot, reason } => format!(
                "seeker slot {} {} released but {target} not acquired: {reason}",
                slot.date, slot.time
            ),
            Notice::TargetBusy { target, reason } => format!("{target} busy: {reason}"),
            Notice::AnswerTimeout { slot } => {
                format!("no target chosen for {} {}", slot.date, slot.time)
            }
            Notice::AnswerUnparseable { reply, reason } => {
                format!("could not use reply '{reply}': {reason}")
            }
            Notice::SeekerPaused { slot } => format!(
                "seeker search paused while {} {} is reserved",
                slot.date, slot.time
            ),
            Notice::Error { context, message } => format!("{context}: {message}"),
        }
    }

    /// Telegram HTML body.
    pub fn render(&self) -> String {
        let e = escape_html;
        match self {
            Notice::MonitoringStarted { targets } => format!(
                "🚀 <b>TC monitoring started</b>\n\n<b>Monitoring {targets} TC page(s)</b>\n\nYou will be notified when slots appear."
            ),
            Notice::SlotsFound { target, slots } => {
                let mut s = format!("🎯 <b>New slots available</b>\n\n<b>Subject:</b> {}\n<b>Slots found:</b>\n", e(target));
                for slot in slots {
                    let _ = writeln!(s, "• {} at {}", e(&slot.date), e(&slot.time));
                }
                s.push_str("\n<b>Status:</b> Attempting to book...");
                s
            }
            Notice::BookingSucceeded { target, slot } => format!(
                "✅ <b>Booking successful</b>\n\n<b>Subject:</b> {}\n{}\n<b>Status:</b> Confirmed",
                e(target),
                slot_lines(slot)
            ),
            Notice::BookingFailed { target, slot, reason } => format!(
                "❌ <b>Booking failed</b>\n\n<b>Subject:</b> {}\n{}\n<b>Error:</b> {}",
                e(target),
                slot_lines(slot),
                e(reason)
            ),
            Notice::TransferStarted { target } => format!(
                "🔄 <b>Transfer started</b>\n\n<b>Target TC:</b> {}\n\n<b>Status:</b> Processing transfer...",
                e(target)
            ),
            Notice::TransferSucceeded { target, slot } => format!(
                "✅ <b>Transfer successful</b>\n\n<b>Target TC:</b> {}\n{}\n<b>Status:</b> Confirmed",
                e(target),
                slot_lines(slot)
            ),
            Notice::TransferFailed { target, reason } => format!(
                "❌ <b>Transfer failed</b>\n\n<b>Target TC:</b> {}\n<b>Error:</b> {}\n\n<b>Status:</b> Please check manually",
                e(target),
                e(reason)
            ),
            Notice::TransferCritical { target, slot, reason } => format!(
                "🚨 <b>CRITICAL: slot lost during transfer</b>\n\nThe seeker reservation was released but the target slot could not be booked.\n\n<b>Target TC:</b> {}\n{}\n<b>Error:</b> {}\n\n<b>Action required:</b> book manually now",
                e(target),
                slot_lines(slot),
                e(reason)
            ),
            Notice::TargetBusy { target, reason } => format!(
                "⚠️ <b>Target busy, seeker slot preserved</b>\n\n<b>Target TC:</b> {}\n<b>Error:</b> {}",
                e(target),
                e(reason)
            ),
            Notice::AnswerTimeout { slot } => format!(
                "⏰ <b>No answer received</b>\n\nThe seeker reservation is still held:\n{}\nSearching stays paused until it is released. Transfer or cancel it manually.",
                slot_lines(slot)
            ),
            Notice::AnswerUnparseable { reply, reason } => format!(
                "❓ <b>Could not understand your reply</b>\n\n<b>Reply:</b> {}\n<b>Problem:</b> {}\n\nReply with a number, a TC name or a TC URL.",
                e(reply),
                e(reason)
            ),
            Notice::SeekerPaused { slot } => format!(
                "⏸ <b>Seeker search paused</b>\n\nThe seeker section already has a reservation:\n{}\nNo new slot is booked until it is released manually.",
                slot_lines(slot)
            ),
            Notice::Error { context, message } => format!(
                "⚠️ <b>Error</b>\n\n<b>Where:</b> {}\n<b>Error:</b> {}",
                e(context),
                e(message)
            ),
        }
    }
}

fn slot_lines(slot: &Slot) -> String {
    format!(
        "<b>Date:</b> {}\n<b>Time:</b> {}\n",
        escape_html(&slot.date),
        escape_html(&slot.time)
    )
}

/// Question posted after the seeker slot is booked.
pub fn format_question(section: &str, slot: &Slot, targets: &[TransferTarget]) -> String {
    let mut s = String::new();
    s.push_str("🎯 <b>Found and booked slot in Seeker TC</b>\n\n");
    let _ = writeln!(s, "<b>Test:</b> {}", escape_html(section));
    s.push_str(&slot_lines(slot));
    s.push_str("\n<b>Which TC should I transfer this to?</b>\n");
    for (i, t) in targets.iter().enumerate() {
        let _ = writeln!(s, "{}. {}", i + 1, escape_html(&t.name));
    }
    s.push_str("\nOr reply with TC URL");
    s
}
