//! Out-of-band question/answer correlation.
//!
//! At most one question is open per process. Inbound messages are routed to it
//! by the [`Correlator`]; with no open question they are dropped.

use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use tcseek_core::new_question_id;
use thiserror::Error;
use tokio::sync::mpsc;
use tokio::time::{timeout_at, Instant};
use tracing::{debug, info};
use ulid::Ulid;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ChannelError {
    #[error("another question is still awaiting an answer")]
    QuestionPending,
    #[error("no answer before the deadline")]
    Timeout,
    #[error("answer stream closed")]
    Closed,
    #[error("could not post question: {0}")]
    Send(String),
}

/// Posts a question and hands back the handle its answers arrive on.
#[async_trait]
pub trait InteractiveChannel: Send + Sync {
    async fn ask(&self, prompt: &str) -> Result<PendingQuestion, ChannelError>;
}

struct OpenQuestion {
    id: Ulid,
    tx: mpsc::UnboundedSender<String>,
}

/// Shared slot for the single open question.
#[derive(Clone, Default)]
pub struct Correlator {
    open: Arc<Mutex<Option<OpenQuestion>>>,
}

impl Correlator {
    pub fn new() -> Self {
        Self::default()
    }

    fn slot(&self) -> MutexGuard<'_, Option<OpenQuestion>> {
        self.open.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Opens the question slot. Fails if one is already open.
    pub fn open(&self) -> Result<PendingQuestion, ChannelError> {
        let mut slot = self.slot();
        if slot.is_some() {
            return Err(ChannelError::QuestionPending);
        }
        let id = new_question_id();
        let (tx, rx) = mpsc::unbounded_channel();
        *slot = Some(OpenQuestion { id, tx });
        debug!(question = %id, "question opened");
        Ok(PendingQuestion {
            id,
            rx,
            correlator: self.clone(),
        })
    }

    /// Routes an inbound message to the open question. Returns false when
    /// nothing is waiting.
    pub fn deliver(&self, text: &str) -> bool {
        match self.slot().as_ref() {
            Some(q) => {
                let sent = q.tx.send(text.to_string()).is_ok();
                debug!(question = %q.id, sent, "answer routed");
                sent
            }
            None => {
                info!("no question pending, ignoring message");
                false
            }
        }
    }

    pub fn is_pending(&self) -> bool {
        self.slot().is_some()
    }

    fn close(&self, id: Ulid) {
        let mut slot = self.slot();
        if slot.as_ref().is_some_and(|q| q.id == id) {
            *slot = None;
            debug!(question = %id, "question closed");
        }
    }
}

/// Handle to the open question. Dropping it closes the question.
pub struct PendingQuestion {
    id: Ulid,
    rx: mpsc::UnboundedReceiver<String>,
    correlator: Correlator,
}

impl PendingQuestion {
    pub fn id(&self) -> Ulid {
        self.id
    }

    /// Next reply, bounded by a deadline shared across calls.
    pub async fn next_answer(&mut self, deadline: Instant) -> Result<String, ChannelError> {
        match timeout_at(deadline, self.rx.recv()).await {
            Ok(Some(answer)) => Ok(answer),
            Ok(None) => Err(ChannelError::Closed),
            Err(_) => Err(ChannelError::Timeout),
        }
    }
}

impl Drop for PendingQuestion {
    fn drop(&mut self) {
        self.correlator.close(self.id);
    }
}
