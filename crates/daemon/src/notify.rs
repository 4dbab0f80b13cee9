use async_trait::async_trait;
use tcseek_core::{Notice, Severity};
use thiserror::Error;
use tracing::{error, info, warn};

#[derive(Debug, Error)]
#[error("notification failed: {0}")]
pub struct NotifyError(pub String);

/// Outbound user notifications.
#[async_trait]
pub trait Notifier: Send + Sync {
    async fn send(&self, notice: &Notice) -> Result<(), NotifyError>;
}

/// Logs `notice` at its severity and sends it. Delivery failures are logged,
/// never returned.
pub async fn report(notifier: &dyn Notifier, notice: Notice) {
    let summary = notice.summary();
    let kind = notice.kind();
    match notice.severity() {
        Severity::Critical => error!(?kind, "CRITICAL: {summary}"),
        Severity::Error => error!(?kind, "{summary}"),
        Severity::Warning => warn!(?kind, "{summary}"),
        Severity::Info => info!(?kind, "{summary}"),
    }
    if let Err(e) = notifier.send(&notice).await {
        warn!(?kind, error = %e, "could not deliver notification");
    }
}
