use std::time::Duration;

use reqwest::Client;
use serde::{de::DeserializeOwned, Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

const API_BASE: &str = "https://api.telegram.org";

#[derive(Debug, Error)]
pub enum TelegramError {
    #[error("telegram transport error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("telegram api error: {0}")]
    Api(String),
}

#[derive(Debug, Deserialize)]
struct Envelope<T> {
    ok: bool,
    result: Option<T>,
    description: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Update {
    pub update_id: i64,
    #[serde(default)]
    pub message: Option<Message>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Message {
    pub chat: Chat,
    #[serde(default)]
    pub text: Option<String>,
}

#[derive(Clone, Debug, Deserialize)]
pub struct Chat {
    pub id: i64,
}

#[derive(Serialize)]
struct SendMessage<'a> {
    chat_id: i64,
    text: &'a str,
    parse_mode: &'static str,
    disable_web_page_preview: bool,
}

#[derive(Serialize)]
struct GetUpdates {
    #[serde(skip_serializing_if = "Option::is_none")]
    offset: Option<i64>,
    timeout: u64,
    allowed_updates: [&'static str; 1],
}

/// Minimal Bot API client: `sendMessage` and long-polling `getUpdates`.
#[derive(Clone)]
pub struct BotApi {
    client: Client,
    base: String,
}

impl BotApi {
    pub fn new(token: &str) -> Result<Self, TelegramError> {
        Ok(Self {
            client: Client::builder().build()?,
            base: format!("{API_BASE}/bot{token}"),
        })
    }

    async fn call<B: Serialize, T: DeserializeOwned>(
        &self,
        method: &str,
        body: &B,
        wait: Duration,
    ) -> Result<T, TelegramError> {
        let env: Envelope<T> = self
            .client
            .post(format!("{}/{method}", self.base))
            .timeout(wait)
            .json(body)
            .send()
            .await?
            .json()
            .await?;
        if !env.ok {
            return Err(TelegramError::Api(
                env.description.unwrap_or_else(|| format!("{method} failed")),
            ));
        }
        env.result
            .ok_or_else(|| TelegramError::Api(format!("{method} returned no result")))
    }

    pub async fn send_message(&self, chat_id: i64, html: &str) -> Result<(), TelegramError> {
        let body = SendMessage {
            chat_id,
            text: html,
            parse_mode: "HTML",
            disable_web_page_preview: true,
        };
        let _: serde_json::Value = self.call("sendMessage", &body, Duration::from_secs(30)).await?;
        debug!(chat_id, "message sent");
        Ok(())
    }

    /// Long-polls for message updates after `offset`.
    pub async fn get_updates(&self, offset: Option<i64>, timeout_secs: u64) -> Result<Vec<Update>, TelegramError> {
        let body = GetUpdates {
            offset,
            timeout: timeout_secs,
            allowed_updates: ["message"],
        };
        self.call("getUpdates", &body, Duration::from_secs(timeout_secs + 10))
            .await
    }
}
