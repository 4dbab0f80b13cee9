use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::sleep;
use tracing::{debug, info, warn};

use super::api::{BotApi, Update};
use crate::channel::Correlator;

const POLL_TIMEOUT_SECS: u64 = 30;
const ERROR_BACKOFF: Duration = Duration::from_secs(5);

/// Routes one update. Returns true when it was handed to an open question.
pub fn route_update(update: &Update, chat_id: i64, correlator: &Correlator) -> bool {
    let Some(msg) = &update.message else {
        return false;
    };
    let Some(text) = msg.text.as_deref() else {
        debug!(update = update.update_id, "ignoring non-text message");
        return false;
    };
    if msg.chat.id != chat_id {
        debug!(chat = msg.chat.id, "ignoring message from other chat");
        return false;
    }
    info!(text, "received telegram message");
    correlator.deliver(text)
}

/// Skips everything queued before startup and returns the next offset.
async fn drop_pending(api: &BotApi) -> Option<i64> {
    match api.get_updates(Some(-1), 0).await {
        Ok(updates) => updates.last().map(|u| u.update_id + 1),
        Err(e) => {
            warn!(error = %e, "could not drop pending updates");
            None
        }
    }
}

/// Long-polls until `shutdown` flips to true.
pub fn spawn_listener(
    api: BotApi,
    chat_id: i64,
    correlator: Correlator,
    mut shutdown: watch::Receiver<bool>,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        info!("starting telegram listener");
        let mut offset = drop_pending(&api).await;
        loop {
            if *shutdown.borrow() {
                break;
            }
            let polled = tokio::select! {
                _ = shutdown.changed() => break,
                r = api.get_updates(offset, POLL_TIMEOUT_SECS) => r,
            };
            match polled {
                Ok(updates) => {
                    for u in &updates {
                        offset = Some(u.update_id + 1);
                        route_update(u, chat_id, &correlator);
                    }
                }
                Err(e) => {
                    warn!(error = %e, "telegram poll failed, backing off");
                    tokio::select! {
                        _ = shutdown.changed() => break,
                        _ = sleep(ERROR_BACKOFF) => {}
                    }
                }
            }
        }
        info!("telegram listener stopped");
    })
}
