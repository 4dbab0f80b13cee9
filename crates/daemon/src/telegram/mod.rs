//! Telegram as notifier and interactive channel.

pub mod api;
mod listener;

use async_trait::async_trait;
use tcseek_core::Notice;

pub use api::{BotApi, TelegramError};
pub use listener::{route_update, spawn_listener};

use crate::channel::{ChannelError, Correlator, InteractiveChannel, PendingQuestion};
use crate::notify::{Notifier, NotifyError};

#[derive(Clone)]
pub struct TelegramNotifier {
    api: BotApi,
    chat_id: i64,
}

impl TelegramNotifier {
    pub fn new(api: BotApi, chat_id: i64) -> Self {
        Self { api, chat_id }
    }
}

#[async_trait]
impl Notifier for TelegramNotifier {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError> {
        self.api
            .send_message(self.chat_id, &notice.render())
            .await
            .map_err(|e| NotifyError(e.to_string()))
    }
}

/// Questions go out as chat messages; answers come back through the listener.
#[derive(Clone)]
pub struct TelegramChannel {
    api: BotApi,
    chat_id: i64,
    correlator: Correlator,
}

impl TelegramChannel {
    pub fn new(api: BotApi, chat_id: i64, correlator: Correlator) -> Self {
        Self {
            api,
            chat_id,
            correlator,
        }
    }
}

#[async_trait]
impl InteractiveChannel for TelegramChannel {
    async fn ask(&self, prompt: &str) -> Result<PendingQuestion, ChannelError> {
        // Open first so a fast reply is not lost.
        let pending = self.correlator.open()?;
        self.api
            .send_message(self.chat_id, prompt)
            .await
            .map_err(|e| ChannelError::Send(e.to_string()))?;
        Ok(pending)
    }
}
